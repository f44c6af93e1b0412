//! Process-wide configuration, resolved once at startup.
//!
//! Values come from a [`VarSet`]: named Cloud Foundry service bindings first,
//! then the process environment. Mandatory keys fail fast with the key's name.
//!
//! ```rust,ignore
//! let settings = Settings::load(&VarSet::from_process_env()?)?;
//! ```

mod vars;

use std::path::PathBuf;
use std::time::Duration;

use axum_extra::extract::cookie::Key;
use url::Url;

use crate::oauth::{ClientCredentialsConfig, DEFAULT_EXCHANGE_TIMEOUT, OAuthConfig};

pub use vars::{DEFAULT_UPS_NAME, Lookup, MapLookup, OsLookup, VarSet, VcapServices};

pub const CLIENT_ID_ENV: &str = "CONSOLE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "CONSOLE_CLIENT_SECRET";
pub const HOSTNAME_ENV: &str = "CONSOLE_HOSTNAME";
pub const API_URL_ENV: &str = "CONSOLE_API_URL";
pub const LOGIN_URL_ENV: &str = "CONSOLE_LOGIN_URL";
pub const UAA_URL_ENV: &str = "CONSOLE_UAA_URL";
pub const LOG_URL_ENV: &str = "CONSOLE_LOG_URL";
pub const PPROF_ENABLED_ENV: &str = "PPROF_ENABLED";
pub const BUILD_INFO_ENV: &str = "BUILD_INFO";
pub const TEMPLATES_PATH_ENV: &str = "TEMPLATES_PATH";
pub const SECURE_COOKIES_ENV: &str = "SECURE_COOKIES";
pub const LOCAL_CF_ENV: &str = "LOCAL_CF";
pub const SESSION_AUTHENTICATION_ENV: &str = "SESSION_AUTHENTICATION_KEY";
pub const SESSION_ENCRYPTION_ENV: &str = "SESSION_ENCRYPTION_KEY";
pub const CSRF_KEY_ENV: &str = "CSRF_KEY";
pub const SMTP_HOST_ENV: &str = "SMTP_HOST";
pub const SMTP_PORT_ENV: &str = "SMTP_PORT";
pub const SMTP_USER_ENV: &str = "SMTP_USER";
pub const SMTP_PASS_ENV: &str = "SMTP_PASS";
pub const SMTP_FROM_ENV: &str = "SMTP_FROM";
pub const SMTP_CERT_ENV: &str = "SMTP_CERT";
pub const TIC_SECRET_ENV: &str = "TIC_SECRET";
pub const GA_TRACKING_ID_ENV: &str = "GA_TRACKING_ID";
pub const NEW_RELIC_ID_ENV: &str = "NEW_RELIC_ID";
pub const NEW_RELIC_BROWSER_LICENSE_KEY_ENV: &str = "NEW_RELIC_BROWSER_LICENSE_KEY";
pub const OAUTH_TIMEOUT_ENV: &str = "OAUTH_TIMEOUT_SECONDS";

const DEFAULT_BUILD_INFO: &str = "developer-build";
const DEFAULT_TEMPLATES_PATH: &str = "./templates";

/// Lower bound of the whole-request timeout.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Headroom on top of the two sequential token endpoint calls of a login.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Length of every hex-encoded secret, in bytes.
const SECRET_KEY_LEN: usize = 32;

/// Startup-fatal configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing required configuration value {0}")]
    Missing(String),

    #[error("{key} must be a boolean, got {value:?}")]
    InvalidBool { key: String, value: String },

    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("could not decode hex value {key}: {source}")]
    InvalidHex {
        key: String,
        source: hex::FromHexError,
    },

    #[error("{key} must decode to {expected} bytes, got {actual}")]
    InvalidKeyLength {
        key: String,
        expected: usize,
        actual: usize,
    },

    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl { key: String, source: url::ParseError },

    #[error("malformed VCAP_SERVICES: {0}")]
    InvalidServices(#[source] serde_json::Error),

    #[error("cannot run with insecure cookies when targeting a production CF environment")]
    InsecureCookies,

    #[error("template error: {0}")]
    Template(String),

    #[error("cannot build the token endpoint client: {0}")]
    HttpClient(#[source] crate::error::Error),
}

/// SMTP parameters for UAA invite mails.
#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    /// PEM encoded x509 certificate.
    pub cert: String,
}

/// Client-side analytics identifiers injected into the app shell.
#[derive(Debug, Clone, Default)]
pub struct Analytics {
    pub ga_tracking_id: String,
    pub new_relic_id: String,
    pub new_relic_browser_license_key: String,
}

/// Immutable service configuration, shared read-only by every handler.
#[derive(Clone)]
pub struct Settings {
    /// User-delegated client talking to UAA.
    pub oauth: OAuthConfig,
    /// Client-credentials client for invites and admin lookups.
    pub high_privileged: ClientCredentialsConfig,
    /// URL where this app is hosted.
    pub app_url: String,
    /// Cloud Controller API.
    pub console_api: String,
    /// Login server, also used for the logout redirect.
    pub login_url: String,
    pub uaa_url: String,
    pub log_url: String,
    pub templates_path: PathBuf,
    pub pprof_enabled: bool,
    pub build_info: String,
    pub secure_cookies: bool,
    /// Targeting a local platform (self-signed certificates, insecure cookies allowed).
    pub local_cf: bool,
    /// Session cookie key: authentication half then encryption half.
    pub session_key: Key,
    /// Key for the signed CSRF cookie.
    pub csrf_key: Key,
    pub smtp: SmtpSettings,
    /// Shared secret with the CF API proxy.
    pub tic_secret: String,
    pub analytics: Analytics,
    /// Bound on each call to the token endpoint.
    pub exchange_timeout: Duration,
}

impl Settings {
    /// Resolve every setting from `vars`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a missing mandatory key, a malformed
    /// value, or insecure cookies outside a local environment.
    pub fn load(vars: &VarSet) -> Result<Self, ConfigError> {
        let templates_path = PathBuf::from(vars.string(TEMPLATES_PATH_ENV, DEFAULT_TEMPLATES_PATH));
        let app_url = base_url(vars, HOSTNAME_ENV)?;
        let console_api = base_url(vars, API_URL_ENV)?;
        let login_url = base_url(vars, LOGIN_URL_ENV)?;
        let uaa_url = base_url(vars, UAA_URL_ENV)?;
        let log_url = base_url(vars, LOG_URL_ENV)?;
        let pprof_enabled = vars.bool(PPROF_ENABLED_ENV, false)?;
        let build_info = vars.string(BUILD_INFO_ENV, DEFAULT_BUILD_INFO);
        let local_cf = vars.must_bool(LOCAL_CF_ENV)?;
        let secure_cookies = vars.must_bool(SECURE_COOKIES_ENV)?;

        if !local_cf && !secure_cookies {
            return Err(ConfigError::InsecureCookies);
        }

        let client_id = vars.must_string(CLIENT_ID_ENV)?;
        let client_secret = vars.must_string(CLIENT_SECRET_ENV)?;
        let token_url = endpoint(UAA_URL_ENV, &uaa_url, "/oauth/token")?;

        let oauth = OAuthConfig::new(
            client_id.clone(),
            client_secret.clone(),
            endpoint(HOSTNAME_ENV, &app_url, "/oauth2callback")?,
            endpoint(LOGIN_URL_ENV, &login_url, "/oauth/authorize")?,
            token_url.clone(),
        );
        let high_privileged = ClientCredentialsConfig::new(client_id, client_secret, token_url);

        let csrf_secret = hex_secret(vars, CSRF_KEY_ENV)?;
        let csrf_key = Key::derive_from(&csrf_secret);

        // Both secrets feed the AEAD key, so rotating either one drops every session.
        let session_master = [
            hex_secret(vars, SESSION_AUTHENTICATION_ENV)?,
            hex_secret(vars, SESSION_ENCRYPTION_ENV)?,
        ]
        .concat();
        let session_key = Key::derive_from(&session_master);

        let smtp = SmtpSettings {
            host: vars.string(SMTP_HOST_ENV, ""),
            port: vars.string(SMTP_PORT_ENV, ""),
            user: vars.string(SMTP_USER_ENV, ""),
            pass: vars.string(SMTP_PASS_ENV, ""),
            from: vars.string(SMTP_FROM_ENV, ""),
            cert: vars.string(SMTP_CERT_ENV, ""),
        };

        let analytics = Analytics {
            ga_tracking_id: vars.string(GA_TRACKING_ID_ENV, ""),
            new_relic_id: vars.string(NEW_RELIC_ID_ENV, ""),
            new_relic_browser_license_key: vars.string(NEW_RELIC_BROWSER_LICENSE_KEY_ENV, ""),
        };

        let exchange_timeout = Duration::from_secs(
            vars.u64(OAUTH_TIMEOUT_ENV, DEFAULT_EXCHANGE_TIMEOUT.as_secs())?,
        );

        Ok(Self {
            oauth,
            high_privileged,
            app_url,
            console_api,
            login_url,
            uaa_url,
            log_url,
            templates_path,
            pprof_enabled,
            build_info,
            secure_cookies,
            local_cf,
            session_key,
            csrf_key,
            smtp,
            tic_secret: vars.string(TIC_SECRET_ENV, ""),
            analytics,
            exchange_timeout,
        })
    }

    /// Where the browser lands after a successful login.
    #[must_use]
    pub fn dashboard_url(&self) -> String {
        format!("{}/#/dashboard", self.app_url)
    }

    /// Provider logout page.
    #[must_use]
    pub fn logout_url(&self) -> String {
        format!("{}/logout.do", self.login_url)
    }

    /// Bound on a whole request. Always longer than the two token endpoint
    /// calls of a login, so a hung UAA is reported as an upstream failure.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        MIN_REQUEST_TIMEOUT.max(self.exchange_timeout * 2 + REQUEST_TIMEOUT_SLACK)
    }
}

/// Mandatory URL-valued key, validated and without trailing slash.
fn base_url(vars: &VarSet, key: &str) -> Result<String, ConfigError> {
    let value = vars.must_string(key)?;
    let trimmed = value.trim().trim_end_matches('/').to_string();
    Url::parse(&trimmed).map_err(|source| ConfigError::InvalidUrl {
        key: key.to_string(),
        source,
    })?;
    Ok(trimmed)
}

fn endpoint(key: &str, base: &str, path: &str) -> Result<Url, ConfigError> {
    format!("{base}{path}")
        .parse()
        .map_err(|source| ConfigError::InvalidUrl {
            key: key.to_string(),
            source,
        })
}

fn hex_secret(vars: &VarSet, key: &str) -> Result<Vec<u8>, ConfigError> {
    let bytes = hex::decode(vars.must_string(key)?.trim()).map_err(|source| ConfigError::InvalidHex {
        key: key.to_string(),
        source,
    })?;
    if bytes.len() != SECRET_KEY_LEN {
        return Err(ConfigError::InvalidKeyLength {
            key: key.to_string(),
            expected: SECRET_KEY_LEN,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn base_pairs() -> Vec<(&'static str, String)> {
        vec![
            (CLIENT_ID_ENV, "dashboard".into()),
            (CLIENT_SECRET_ENV, "s3cret".into()),
            (HOSTNAME_ENV, "https://dashboard.example.com".into()),
            (API_URL_ENV, "https://api.example.com".into()),
            (LOGIN_URL_ENV, "https://login.example.com".into()),
            (UAA_URL_ENV, "https://uaa.example.com/".into()),
            (LOG_URL_ENV, "https://log.example.com".into()),
            (SECURE_COOKIES_ENV, "true".into()),
            (LOCAL_CF_ENV, "false".into()),
            (SESSION_AUTHENTICATION_ENV, "11".repeat(32)),
            (SESSION_ENCRYPTION_ENV, "22".repeat(32)),
            (CSRF_KEY_ENV, "33".repeat(32)),
        ]
    }

    fn vars_with(overrides: &[(&'static str, &str)], removed: &[&str]) -> VarSet {
        let mut pairs = base_pairs();
        pairs.retain(|(k, _)| !removed.contains(k) && !overrides.iter().any(|(o, _)| o == k));
        pairs.extend(overrides.iter().map(|(k, v)| (*k, (*v).to_string())));
        VarSet::new().with_lookup(MapLookup::from_iter(pairs))
    }

    #[test]
    fn loads_complete_configuration() {
        let settings = Settings::load(&vars_with(&[], &[])).unwrap();

        assert_eq!(settings.app_url, "https://dashboard.example.com");
        assert_eq!(settings.uaa_url, "https://uaa.example.com");
        assert_eq!(settings.oauth.token_url().as_str(), "https://uaa.example.com/oauth/token");
        assert_eq!(
            settings.oauth.auth_url().as_str(),
            "https://login.example.com/oauth/authorize"
        );
        assert_eq!(
            settings.oauth.redirect_uri().as_str(),
            "https://dashboard.example.com/oauth2callback"
        );
        assert_eq!(settings.high_privileged.scopes(), &["scim.invite", "cloud_controller.admin", "scim.read"]);
        assert_eq!(settings.dashboard_url(), "https://dashboard.example.com/#/dashboard");
        assert_eq!(settings.logout_url(), "https://login.example.com/logout.do");
    }

    #[test]
    fn optional_keys_use_defaults() {
        let settings = Settings::load(&vars_with(&[], &[])).unwrap();

        assert_eq!(settings.build_info, "developer-build");
        assert_eq!(settings.templates_path, PathBuf::from("./templates"));
        assert!(!settings.pprof_enabled);
        assert!(settings.smtp.host.is_empty());
        assert!(settings.analytics.ga_tracking_id.is_empty());
        assert_eq!(settings.exchange_timeout, Duration::from_secs(5));
        assert_eq!(settings.request_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn insecure_cookies_rejected_outside_local_cf() {
        let vars = vars_with(&[(SECURE_COOKIES_ENV, "false"), (LOCAL_CF_ENV, "false")], &[]);
        let err = Settings::load(&vars).err().unwrap();
        assert!(matches!(err, ConfigError::InsecureCookies));
        assert!(err.to_string().contains("insecure cookies"));
    }

    #[test]
    fn insecure_cookies_allowed_for_local_cf() {
        let vars = vars_with(&[(SECURE_COOKIES_ENV, "false"), (LOCAL_CF_ENV, "true")], &[]);
        let settings = Settings::load(&vars).unwrap();
        assert!(!settings.secure_cookies);
        assert!(settings.local_cf);
    }

    #[test]
    fn missing_mandatory_key_is_named() {
        for key in [CLIENT_SECRET_ENV, LOG_URL_ENV, LOCAL_CF_ENV, CSRF_KEY_ENV] {
            let err = Settings::load(&vars_with(&[], &[key])).err().unwrap();
            assert!(matches!(err, ConfigError::Missing(ref k) if k == key), "{key}: {err}");
        }
    }

    #[test]
    fn malformed_hex_is_rejected() {
        let vars = vars_with(&[(SESSION_AUTHENTICATION_ENV, "not-hex")], &[]);
        assert!(matches!(
            Settings::load(&vars).err().unwrap(),
            ConfigError::InvalidHex { ref key, .. } if key == SESSION_AUTHENTICATION_ENV
        ));
    }

    #[test]
    fn short_key_is_rejected() {
        let short = "ab".repeat(16);
        let vars = vars_with(&[(SESSION_ENCRYPTION_ENV, short.as_str())], &[]);
        assert!(matches!(
            Settings::load(&vars).err().unwrap(),
            ConfigError::InvalidKeyLength { expected: 32, actual: 16, .. }
        ));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let vars = vars_with(&[(HOSTNAME_ENV, "dashboard.example.com")], &[]);
        assert!(matches!(
            Settings::load(&vars).err().unwrap(),
            ConfigError::InvalidUrl { ref key, .. } if key == HOSTNAME_ENV
        ));
    }

    #[test]
    fn optional_values_are_read() {
        let vars = vars_with(
            &[
                (BUILD_INFO_ENV, "test-build-42"),
                (SMTP_HOST_ENV, "smtp.example.com"),
                (PPROF_ENABLED_ENV, "1"),
                (OAUTH_TIMEOUT_ENV, "12"),
                (GA_TRACKING_ID_ENV, "UA-1"),
            ],
            &[],
        );
        let settings = Settings::load(&vars).unwrap();
        assert_eq!(settings.build_info, "test-build-42");
        assert_eq!(settings.smtp.host, "smtp.example.com");
        assert!(settings.pprof_enabled);
        assert_eq!(settings.exchange_timeout, Duration::from_secs(12));
        assert_eq!(settings.request_timeout(), Duration::from_secs(29));
        assert_eq!(settings.analytics.ga_tracking_id, "UA-1");
    }

    fn session_cookie(settings: &Settings, session: &crate::web::Session) -> axum::http::HeaderMap {
        use axum::http::header::{COOKIE, SET_COOKIE};
        use axum::response::IntoResponse;
        use axum_extra::extract::PrivateCookieJar;

        let store = crate::web::SessionStore::new(settings.session_key.clone(), true);
        let jar = store
            .save(PrivateCookieJar::new(settings.session_key.clone()), session)
            .unwrap();
        let response = jar.into_response();
        let set_cookie = response.headers()[SET_COOKIE].to_str().unwrap();

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(COOKIE, set_cookie.split(';').next().unwrap().parse().unwrap());
        headers
    }

    #[test]
    fn both_session_secrets_key_the_cookie() {
        use crate::web::{Session, SessionLoad, SessionStore};

        let session = Session {
            state: Some("n".to_string().into()),
            token: None,
        };
        let original = Settings::load(&vars_with(&[], &[])).unwrap();
        let headers = session_cookie(&original, &session);

        let same = SessionStore::new(original.session_key.clone(), true);
        assert_eq!(same.load(&headers), SessionLoad::Decoded(session));

        let rotated_auth = "99".repeat(32);
        let rotated_enc = "88".repeat(32);
        for (key, value) in [
            (SESSION_AUTHENTICATION_ENV, rotated_auth.as_str()),
            (SESSION_ENCRYPTION_ENV, rotated_enc.as_str()),
        ] {
            let rotated = Settings::load(&vars_with(&[(key, value)], &[])).unwrap();
            let store = SessionStore::new(rotated.session_key.clone(), true);
            assert_eq!(store.load(&headers), SessionLoad::Tampered, "{key}");
        }
    }
}
