/// Errors raised while talking to UAA or encoding the session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("OAuth2 {operation} failed (status {status:?}): {detail}")]
    OAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint did not answer in time during {0}")]
    Timeout(&'static str),

    #[error("token response carries no refresh token")]
    MissingRefreshToken,

    #[error("session of {0} bytes does not fit in the session cookie")]
    SessionTooLarge(usize),

    #[error("session encoding error: {0}")]
    SessionEncoding(#[from] serde_json::Error),
}

impl Error {
    /// Classifies a transport failure, keeping timeouts distinct.
    pub(crate) fn transport(err: reqwest::Error, operation: &'static str) -> Self {
        if err.is_timeout() {
            Self::Timeout(operation)
        } else {
            Self::Http(err)
        }
    }
}
