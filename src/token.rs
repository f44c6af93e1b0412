use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_DELTA: Duration = Duration::seconds(10);

/// OAuth token as kept in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry: Option<OffsetDateTime>,
}

impl Token {
    /// Whether the token can still be presented to the platform.
    ///
    /// A token without expiry never expires.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - EXPIRY_DELTA > now,
            None => true,
        }
    }

    /// Wipes the access token and expiry, keeping only what a refresh needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRefreshToken`] if the provider issued none.
    pub fn into_refresh_seed(self) -> Result<RefreshSeed, Error> {
        match self.refresh_token {
            Some(refresh_token) if !refresh_token.is_empty() => Ok(RefreshSeed {
                refresh_token,
                token_type: self.token_type,
            }),
            _ => Err(Error::MissingRefreshToken),
        }
    }

    /// Replaces whatever refresh token the last exchange returned.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: String) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }
}

/// A token stripped down to its refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSeed {
    pub refresh_token: String,
    pub token_type: String,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self, now: OffsetDateTime) -> Token {
        Token {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry: self
                .expires_in
                .filter(|secs| *secs > 0)
                // An expiry beyond the representable range is as good as none.
                .and_then(|secs| now.checked_add(Duration::seconds(secs))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<OffsetDateTime>) -> Token {
        Token {
            access_token: "access".into(),
            token_type: "bearer".into(),
            refresh_token: Some("refresh".into()),
            expiry,
        }
    }

    #[test]
    fn token_without_expiry_is_valid() {
        assert!(token(None).is_valid());
    }

    #[test]
    fn future_expiry_is_valid() {
        let now = OffsetDateTime::now_utc();
        assert!(token(Some(now + Duration::hours(1))).is_valid_at(now));
    }

    #[test]
    fn expiry_inside_delta_is_invalid() {
        let now = OffsetDateTime::now_utc();
        assert!(!token(Some(now + Duration::seconds(5))).is_valid_at(now));
        assert!(!token(Some(now - Duration::hours(1))).is_valid_at(now));
    }

    #[test]
    fn empty_access_token_is_invalid() {
        let mut t = token(None);
        t.access_token.clear();
        assert!(!t.is_valid());
    }

    #[test]
    fn refresh_seed_drops_access_token() {
        let seed = token(Some(OffsetDateTime::now_utc())).into_refresh_seed().unwrap();
        assert_eq!(seed.refresh_token, "refresh");
        assert_eq!(seed.token_type, "bearer");
    }

    #[test]
    fn refresh_seed_requires_refresh_token() {
        let mut t = token(None);
        t.refresh_token = None;
        assert!(matches!(t.into_refresh_seed(), Err(Error::MissingRefreshToken)));

        let mut t = token(None);
        t.refresh_token = Some(String::new());
        assert!(matches!(t.into_refresh_seed(), Err(Error::MissingRefreshToken)));
    }

    #[test]
    fn response_expiry_is_absolute() {
        let now = OffsetDateTime::now_utc();
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","token_type":"bearer","expires_in":3600,"refresh_token":""}"#,
        )
        .unwrap();
        let t = response.into_token(now);
        assert_eq!(t.expiry, Some(now + Duration::seconds(3600)));
        assert_eq!(t.refresh_token, None);
    }

    #[test]
    fn out_of_range_expires_in_means_no_expiry() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","token_type":"bearer","expires_in":9223372036854775807}"#,
        )
        .unwrap();
        let t = response.into_token(OffsetDateTime::now_utc());
        assert_eq!(t.expiry, None);
        assert!(t.is_valid());
    }

    #[test]
    fn token_survives_cookie_encoding() {
        let expiry = OffsetDateTime::from_unix_timestamp(1_900_000_000).unwrap();
        let t = token(Some(expiry));
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("2030-03-17T17:46:40Z"));
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
