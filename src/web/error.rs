use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Per-request failures of the dashboard's HTTP entry points.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Callback `state` missing or not the one stored in the session.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Callback carried no authorization code.
    #[error("authorization code missing from callback")]
    MissingCode,

    /// UAA token exchange failed or timed out.
    #[error("upstream authentication failure: {0}")]
    Upstream(#[source] crate::error::Error),

    /// Session could not be written back.
    #[error("session error: {0}")]
    Session(#[source] crate::error::Error),

    #[error("render error: {0}")]
    Render(String),

    /// Unsafe method without a matching anti-forgery token.
    #[error("CSRF token missing or invalid")]
    CsrfRejected,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            Self::StateMismatch => (StatusCode::UNAUTHORIZED, self.to_string()).into_response(),
            Self::MissingCode => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            Self::CsrfRejected => (StatusCode::FORBIDDEN, self.to_string()).into_response(),
            Self::Upstream(ref e) => {
                tracing::error!(error = %e, "Token exchange failed");
                (StatusCode::BAD_GATEWAY, "upstream authentication failure").into_response()
            }
            Self::Session(_) | Self::Render(_) => {
                tracing::error!(error = %self, "Dashboard internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(WebError::StateMismatch.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(WebError::MissingCode.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(WebError::CsrfRejected.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            WebError::Upstream(crate::error::Error::Timeout("code exchange"))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WebError::Session(crate::error::Error::SessionTooLarge(5000))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
