#![doc = include_str!("../README.md")]

pub mod error;
pub mod nonce;
pub mod oauth;
pub mod settings;
pub mod token;
pub mod types;
pub mod web;

// Re-exports for convenient access
pub use error::Error;
pub use nonce::{generate_csrf_token, generate_state};
pub use oauth::{AuthClient, ClientCredentialsConfig, OAuthConfig};
pub use settings::{ConfigError, Settings, VarSet};
pub use token::{RefreshSeed, Token};
pub use types::{StateNonce, TokenFormat};
pub use web::{AppState, router};
