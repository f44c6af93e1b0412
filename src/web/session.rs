use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, CookieJar, Key, SameSite};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::state::AppState;
use crate::error::Error;
use crate::token::Token;
use crate::types::StateNonce;

/// Name of the encrypted session cookie.
pub const SESSION_COOKIE: &str = "session";

/// 7 days at most.
const SESSION_MAX_AGE: Duration = Duration::days(7);

/// Browser limit for a cookie's name and value.
const MAX_COOKIE_BYTES: usize = 4096;

/// AES-GCM nonce plus authentication tag added by the private jar.
const ENCRYPTION_OVERHEAD: usize = 12 + 16;

/// Per-browser state carried in the session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Present only while a login round-trip is in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateNonce>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

impl Session {
    /// The stored token, if it can still be used.
    #[must_use]
    pub fn valid_token(&self) -> Option<&Token> {
        self.token.as_ref().filter(|t| t.is_valid())
    }
}

/// Outcome of reading the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLoad {
    Decoded(Session),
    /// No session cookie on the request.
    Absent,
    /// A cookie was sent but failed decryption or decoding.
    Tampered,
}

impl SessionLoad {
    /// Handlers treat an absent or tampered cookie as an empty session.
    #[must_use]
    pub fn into_session(self) -> Session {
        match self {
            Self::Decoded(session) => session,
            Self::Absent | Self::Tampered => Session::default(),
        }
    }
}

/// Stateless session store backed by one authenticated, encrypted cookie.
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    secure: bool,
    max_age: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(key: Key, secure: bool) -> Self {
        Self {
            key,
            secure,
            max_age: SESSION_MAX_AGE,
        }
    }

    /// Read the session from the request's `Cookie` headers. Never fails.
    #[must_use]
    pub fn load(&self, headers: &HeaderMap) -> SessionLoad {
        if CookieJar::from_headers(headers).get(SESSION_COOKIE).is_none() {
            return SessionLoad::Absent;
        }

        let jar = PrivateCookieJar::from_headers(headers, self.key.clone());
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            tracing::warn!("session cookie failed decryption, treating as anonymous");
            return SessionLoad::Tampered;
        };

        match serde_json::from_str::<Session>(cookie.value()) {
            Ok(session) => SessionLoad::Decoded(session),
            Err(e) => {
                tracing::warn!(error = %e, "session cookie failed decoding, treating as anonymous");
                SessionLoad::Tampered
            }
        }
    }

    /// Write `session` into `jar` as the encrypted session cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionTooLarge`] if the encrypted cookie would exceed
    /// what browsers accept.
    pub fn save(&self, jar: PrivateCookieJar, session: &Session) -> Result<PrivateCookieJar, Error> {
        let value = serde_json::to_string(session)?;

        let encoded_len = 4 * (value.len() + ENCRYPTION_OVERHEAD).div_ceil(3);
        if SESSION_COOKIE.len() + 1 + encoded_len > MAX_COOKIE_BYTES {
            return Err(Error::SessionTooLarge(value.len()));
        }

        let cookie = Cookie::build((SESSION_COOKIE, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(self.max_age)
            .build();

        Ok(jar.add(cookie))
    }

    /// Tell the browser to discard the session cookie immediately.
    #[must_use]
    pub fn invalidate(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        let cookie = Cookie::build((SESSION_COOKIE, ""))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build();

        jar.add(cookie)
    }
}

/// The request's session, empty when the cookie is missing or unreadable.
///
/// ```rust,ignore
/// async fn handler(CurrentSession(session): CurrentSession) -> impl IntoResponse {
///     session.valid_token().is_some().to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(state.sessions.load(&parts.headers).into_session()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;

    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Key::from(&[7u8; 64]), true)
    }

    fn set_cookie_headers(jar: PrivateCookieJar) -> Vec<String> {
        jar.into_response()
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn request_headers(set_cookie: &str) -> HeaderMap {
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    fn session_with_state() -> Session {
        Session {
            state: Some(StateNonce::from("nonce".to_string())),
            token: None,
        }
    }

    #[test]
    fn saved_session_loads_back() {
        let store = store();
        let jar = store.save(PrivateCookieJar::new(store.key.clone()), &session_with_state()).unwrap();
        let cookies = set_cookie_headers(jar);
        assert_eq!(cookies.len(), 1);

        let loaded = store.load(&request_headers(&cookies[0]));
        assert_eq!(loaded, SessionLoad::Decoded(session_with_state()));
    }

    #[test]
    fn cookie_attributes() {
        let store = store();
        let jar = store.save(PrivateCookieJar::new(store.key.clone()), &Session::default()).unwrap();
        let cookie = &set_cookie_headers(jar)[0];

        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("Path=/"));
    }

    #[test]
    fn insecure_store_omits_secure_flag() {
        let store = SessionStore::new(Key::from(&[7u8; 64]), false);
        let jar = store.save(PrivateCookieJar::new(store.key.clone()), &Session::default()).unwrap();
        assert!(!set_cookie_headers(jar)[0].contains("Secure"));
    }

    #[test]
    fn missing_cookie_is_absent() {
        assert_eq!(store().load(&HeaderMap::new()), SessionLoad::Absent);
    }

    #[test]
    fn forged_cookie_is_tampered() {
        let loaded = store().load(&request_headers("session=bm90LWVuY3J5cHRlZA"));
        assert_eq!(loaded, SessionLoad::Tampered);
        assert_eq!(loaded.into_session(), Session::default());
    }

    #[test]
    fn cookie_from_another_key_is_tampered() {
        let other = SessionStore::new(Key::from(&[9u8; 64]), true);
        let jar = other.save(PrivateCookieJar::new(other.key.clone()), &session_with_state()).unwrap();
        let cookies = set_cookie_headers(jar);

        assert_eq!(store().load(&request_headers(&cookies[0])), SessionLoad::Tampered);
    }

    #[test]
    fn oversized_session_is_rejected() {
        let store = store();
        let session = Session {
            state: None,
            token: Some(Token {
                access_token: "x".repeat(4000),
                token_type: "bearer".into(),
                refresh_token: None,
                expiry: None,
            }),
        };
        let err = store.save(PrivateCookieJar::new(store.key.clone()), &session).err().unwrap();
        assert!(matches!(err, Error::SessionTooLarge(_)));
    }

    #[test]
    fn invalidate_expires_cookie_immediately() {
        let store = store();
        let jar = store.invalidate(PrivateCookieJar::new(store.key.clone()));
        let cookie = &set_cookie_headers(jar)[0];

        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn expired_token_is_not_valid() {
        let session = Session {
            state: None,
            token: Some(Token {
                access_token: "jwt".into(),
                token_type: "bearer".into(),
                refresh_token: Some("refresh".into()),
                expiry: Some(OffsetDateTime::now_utc() - Duration::minutes(1)),
            }),
        };
        assert!(session.valid_token().is_none());
    }
}
