use axum::Router;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::{PrivateCookieJar, SignedCookieJar};
use serde::{Deserialize, Serialize};
use tower_http::timeout::TimeoutLayer;

use super::csrf;
use super::error::WebError;
use super::session::CurrentSession;
use super::state::AppState;
use super::templates::IndexPage;
use crate::nonce;

/// Create the dashboard router.
///
/// Every request is bounded by [`Settings::request_timeout`](crate::settings::Settings::request_timeout).
pub fn router(state: AppState) -> Router {
    let request_timeout = state.settings.request_timeout();

    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/login", get(login))
        .route("/oauth2callback", get(callback))
        .route("/logout", get(logout))
        .layer(middleware::from_fn_with_state(state.clone(), csrf::csrf_protect))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

// ── Index ──────────────────────────────────────────────────────────

async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(SignedCookieJar, Html<String>), WebError> {
    let (jar, token) = csrf::issue_token(&state, &headers);
    let analytics = &state.settings.analytics;

    let html = state.templates.render_index(&IndexPage {
        csrf_token: &token,
        ga_tracking_id: &analytics.ga_tracking_id,
        new_relic_id: &analytics.new_relic_id,
        new_relic_browser_license_key: &analytics.new_relic_browser_license_key,
    })?;

    Ok((jar, Html(html)))
}

// ── Ping ───────────────────────────────────────────────────────────

const PING_STATUS_ALIVE: &str = "alive";

#[derive(Serialize)]
struct PingData<'a> {
    status: &'a str,
    #[serde(rename = "build-info")]
    build_info: &'a str,
}

impl PingData<'_> {
    fn is_system_healthy(&self) -> bool {
        self.status == PING_STATUS_ALIVE
    }

    fn into_response(self) -> Response {
        let (body, converted) = match serde_json::to_vec(&self) {
            Ok(body) => (body, true),
            Err(e) => (
                serde_json::json!({ "status": "error", "data": e.to_string() })
                    .to_string()
                    .into_bytes(),
                false,
            ),
        };

        let status = if self.is_system_healthy() && converted {
            StatusCode::OK
        } else {
            tracing::error!(payload = %String::from_utf8_lossy(&body), "Ping failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, [(CONTENT_TYPE, "application/json")], body).into_response()
    }
}

async fn ping(State(state): State<AppState>) -> Response {
    PingData {
        status: PING_STATUS_ALIVE,
        build_info: &state.settings.build_info,
    }
    .into_response()
}

// ── Login ──────────────────────────────────────────────────────────

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    CurrentSession(mut session): CurrentSession,
) -> Result<Response, WebError> {
    if session.valid_token().is_some() {
        return Ok(found(&state.settings.dashboard_url()));
    }

    let login_state = nonce::generate_state();
    let url = state.client.authorization_url(&login_state);
    session.state = Some(login_state);

    let jar = state.sessions.save(jar, &session).map_err(WebError::Session)?;

    Ok((jar, found(url.as_str())).into_response())
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    CurrentSession(mut session): CurrentSession,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Response), WebError> {
    let echoed = params.state.as_deref().unwrap_or_default();
    if !session.state.as_ref().is_some_and(|stored| stored.matches(echoed)) {
        tracing::warn!("OAuth state mismatch");
        return Err(WebError::StateMismatch);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!(
            error = params.error.as_deref().unwrap_or("none"),
            description = params.error_description.as_deref().unwrap_or(""),
            "OAuth callback without authorization code"
        );
        return Err(WebError::MissingCode);
    };

    let token = state
        .client
        .exchange_for_session_token(&code)
        .await
        .map_err(WebError::Upstream)?;

    session.token = Some(token);
    session.state = None;

    let jar = state.sessions.save(jar, &session).map_err(WebError::Session)?;

    tracing::info!("UAA login successful");

    Ok((jar, found(&state.settings.dashboard_url())))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout(State(state): State<AppState>, jar: PrivateCookieJar) -> (PrivateCookieJar, Response) {
    let jar = state.sessions.invalidate(jar);
    (jar, found(&state.settings.logout_url()))
}

// ── Helpers ────────────────────────────────────────────────────────

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}
