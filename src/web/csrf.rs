use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::error::WebError;
use super::state::AppState;
use crate::nonce;

pub const CSRF_COOKIE: &str = "_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";

const CSRF_MAX_AGE: Duration = Duration::hours(12);

/// Reuse the request's CSRF token or mint a new one, returning the jar that
/// must be sent back with the response.
pub(super) fn issue_token(state: &AppState, headers: &HeaderMap) -> (SignedCookieJar, String) {
    let jar = SignedCookieJar::from_headers(headers, state.settings.csrf_key.clone());
    if let Some(existing) = jar.get(CSRF_COOKIE) {
        let token = existing.value().to_string();
        return (jar, token);
    }

    let token = nonce::generate_csrf_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .http_only(true)
        .secure(state.settings.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CSRF_MAX_AGE)
        .build();

    (jar.add(cookie), token)
}

/// Rejects unsafe methods unless `X-CSRF-Token` matches the signed cookie.
pub async fn csrf_protect(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if is_safe(req.method()) {
        return next.run(req).await;
    }

    let jar = SignedCookieJar::from_headers(req.headers(), state.settings.csrf_key.clone());
    let expected = jar.get(CSRF_COOKIE);
    let provided = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok());

    let valid = match (expected, provided) {
        (Some(cookie), Some(header)) => !header.is_empty() && cookie.value() == header,
        _ => false,
    };

    if !valid {
        tracing::warn!(method = %req.method(), uri = %req.uri(), "CSRF check failed");
        return WebError::CsrfRejected.into_response();
    }
    next.run(req).await
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}
