use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::session::SessionStore;
use super::templates::Templates;
use crate::oauth::AuthClient;
use crate::settings::{ConfigError, Settings};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Arc<Settings>,
    pub(crate) client: Arc<AuthClient>,
    pub(crate) sessions: SessionStore,
    pub(crate) templates: Arc<Templates>,
}

impl AppState {
    /// Wire the handlers' collaborators from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if the index template is unreadable or
    /// invalid, or [`ConfigError::HttpClient`] if the token endpoint client
    /// cannot be built.
    pub fn new(settings: Settings) -> Result<Self, ConfigError> {
        let templates = Templates::load(&settings.templates_path)?;
        Self::with_templates(settings, templates)
    }

    /// Like [`new`](Self::new) with already loaded templates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HttpClient`] if the token endpoint client cannot
    /// be built.
    pub fn with_templates(settings: Settings, templates: Templates) -> Result<Self, ConfigError> {
        if settings.local_cf {
            tracing::warn!("targeting a local CF: TLS certificates of UAA are not verified");
        }
        let client = AuthClient::with_timeout(
            settings.oauth.clone(),
            settings.high_privileged.clone(),
            settings.exchange_timeout,
            settings.local_cf,
        )
        .map_err(ConfigError::HttpClient)?;
        let sessions = SessionStore::new(settings.session_key.clone(), settings.secure_cookies);

        Ok(Self {
            settings: Arc::new(settings),
            client: Arc::new(client),
            sessions,
            templates: Arc::new(templates),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn client(&self) -> &AuthClient {
        &self.client
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.settings.session_key.clone()
    }
}
