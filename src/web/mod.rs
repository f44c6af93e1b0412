//! HTTP surface of the dashboard backend.
//!
//! Serves the app shell, drives the UAA login handshake and keeps the
//! per-browser session in one encrypted cookie. No server-side session store.
//!
//! ```rust,ignore
//! use cf_dashboard::settings::{Settings, VarSet};
//! use cf_dashboard::web::{AppState, router};
//!
//! let settings = Settings::load(&VarSet::from_process_env()?)?;
//! let app = router(AppState::new(settings)?);
//! axum::serve(listener, app).await?;
//! ```

mod csrf;
mod error;
mod routes;
mod session;
mod state;
mod templates;

pub use csrf::{CSRF_COOKIE, CSRF_HEADER, csrf_protect};
pub use error::WebError;
pub use routes::router;
pub use session::{CurrentSession, SESSION_COOKIE, Session, SessionLoad, SessionStore};
pub use state::AppState;
pub use templates::{IndexPage, Templates};
