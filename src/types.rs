use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Single-use value binding an authorization request to its callback.
///
/// Generated by [`generate_state`](crate::nonce::generate_state) and kept in
/// the session until the callback consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct StateNonce(pub String);

impl StateNonce {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison against the `state` echoed back by the provider.
    ///
    /// An empty echo never matches, even against an empty stored value.
    #[must_use]
    pub fn matches(&self, echoed: &str) -> bool {
        !echoed.is_empty() && self.0 == echoed
    }
}

/// Access token format requested from the UAA token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// Self-contained signed JWT (UAA default).
    Jwt,
    /// Reference string, much smaller than a JWT.
    Opaque,
}

impl TokenFormat {
    /// Value for the `token_format` query parameter, `None` for the default.
    #[must_use]
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            Self::Jwt => None,
            Self::Opaque => Some("opaque"),
        }
    }
}
