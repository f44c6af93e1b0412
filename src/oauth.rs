use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use url::Url;

use crate::error::Error;
use crate::token::{RefreshSeed, Token, TokenResponse};
use crate::types::{StateNonce, TokenFormat};

/// Timeout for every call to the token endpoint unless overridden.
///
/// A login makes two sequential calls; both must fit inside the request
/// timeout so a hung UAA surfaces as an upstream failure.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Scopes requested on behalf of the signed-in user.
pub const USER_SCOPES: [&str; 5] = [
    "cloud_controller.read",
    "cloud_controller.write",
    "cloud_controller.admin",
    "scim.read",
    "openid",
];

/// Scopes of the machine-to-machine client used for invites and admin lookups.
pub const ADMIN_SCOPES: [&str; 3] = ["scim.invite", "cloud_controller.admin", "scim.read"];

/// User-delegated `OAuth2` configuration against UAA.
///
/// ```rust,ignore
/// let config = OAuthConfig::new(
///     "dashboard",
///     "secret",
///     "https://dashboard.example.com/oauth2callback".parse()?,
///     "https://login.example.com/oauth/authorize".parse()?,
///     "https://uaa.example.com/oauth/token".parse()?,
/// );
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) scopes: Vec<String>,
}

impl OAuthConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
        auth_url: Url,
        token_url: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            auth_url,
            token_url,
            scopes: USER_SCOPES.iter().map(ToString::to_string).collect(),
        }
    }

    /// Override the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Client-credentials configuration. Never tied to a user session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientCredentialsConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) token_url: Url,
    pub(crate) scopes: Vec<String>,
}

impl ClientCredentialsConfig {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, token_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
            scopes: ADMIN_SCOPES.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Builds the HTTP client used for every token endpoint call.
///
/// `accept_invalid_certs` is only meant for local platforms with self-signed
/// certificates.
///
/// # Errors
///
/// Returns [`Error::Http`] if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration, accept_invalid_certs: bool) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(Into::into)
}

/// `OAuth2` client for the UAA token endpoint.
pub struct AuthClient {
    config: OAuthConfig,
    admin: ClientCredentialsConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CodeGrant<'a> {
    grant_type: &'static str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct ClientCredentialsGrant {
    grant_type: &'static str,
    scope: String,
}

impl AuthClient {
    /// Create a client with the default exchange timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: OAuthConfig, admin: ClientCredentialsConfig) -> Result<Self, Error> {
        Self::with_timeout(config, admin, DEFAULT_EXCHANGE_TIMEOUT, false)
    }

    /// Create a client whose token endpoint calls are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_timeout(
        config: OAuthConfig,
        admin: ClientCredentialsConfig,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, Error> {
        let http = build_http_client(timeout, accept_invalid_certs)?;
        Ok(Self { config, admin, http })
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Authorization endpoint URL for `state`, requesting online access.
    #[must_use]
    pub fn authorization_url(&self, state: &StateNonce) -> Url {
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("access_type", "online")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("state", state.as_str());
        url
    }

    /// Exchange an authorization code, asking for `format` access tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] or [`Error::Http`] on transport failure, or
    /// [`Error::OAuth`] if the token endpoint rejects the code.
    pub async fn exchange_code(&self, code: &str, format: TokenFormat) -> Result<Token, Error> {
        let mut url = self.config.token_url.clone();
        if let Some(value) = format.query_value() {
            url.query_pairs_mut().append_pair("token_format", value);
        }

        let grant = CodeGrant {
            grant_type: "authorization_code",
            code,
            redirect_uri: self.config.redirect_uri.as_str(),
        };

        self.post_token(url, &self.config.client_id, &self.config.client_secret, &grant, "code exchange")
            .await
    }

    /// Trade a refresh token for a fresh access token from the standard
    /// (JWT) endpoint.
    ///
    /// # Errors
    ///
    /// As [`exchange_code`](Self::exchange_code).
    pub async fn refresh(&self, seed: &RefreshSeed) -> Result<Token, Error> {
        let grant = RefreshGrant {
            grant_type: "refresh_token",
            refresh_token: &seed.refresh_token,
        };

        self.post_token(
            self.config.token_url.clone(),
            &self.config.client_id,
            &self.config.client_secret,
            &grant,
            "token refresh",
        )
        .await
    }

    /// Complete the login handshake for `code`.
    ///
    /// The code is exchanged for an opaque token so the refresh token stays
    /// small, then the opaque refresh token is immediately traded for a JWT
    /// access token, which the Cloud Controller requires. The stored token
    /// pairs that JWT with the original opaque refresh token.
    ///
    /// # Errors
    ///
    /// Fails if either call fails, if the first call issues no refresh token,
    /// or if the second call returns an empty access token.
    pub async fn exchange_for_session_token(&self, code: &str) -> Result<Token, Error> {
        let opaque = self.exchange_code(code, TokenFormat::Opaque).await?;
        let seed = opaque.into_refresh_seed()?;

        let jwt = self.refresh(&seed).await?;
        if jwt.access_token.is_empty() {
            return Err(Error::OAuth {
                operation: "token refresh",
                status: None,
                detail: "response carries no access token".into(),
            });
        }

        Ok(jwt.with_refresh_token(seed.refresh_token))
    }

    /// Obtain a token for the high-privileged client (client-credentials
    /// grant).
    ///
    /// # Errors
    ///
    /// As [`exchange_code`](Self::exchange_code).
    pub async fn client_credentials_token(&self) -> Result<Token, Error> {
        let grant = ClientCredentialsGrant {
            grant_type: "client_credentials",
            scope: self.admin.scopes.join(" "),
        };

        self.post_token(
            self.admin.token_url.clone(),
            &self.admin.client_id,
            &self.admin.client_secret,
            &grant,
            "client credentials",
        )
        .await
    }

    async fn post_token<F: Serialize>(
        &self,
        url: Url,
        client_id: &str,
        client_secret: &str,
        form: &F,
        operation: &'static str,
    ) -> Result<Token, Error> {
        let response = self
            .http
            .post(url)
            .basic_auth(client_id, Some(client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| Error::transport(e, operation))?;

        let response = Self::ensure_success(response, operation).await?;
        let body = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::transport(e, operation))?;

        tracing::debug!(operation, "token endpoint call succeeded");
        Ok(body.into_token(OffsetDateTime::now_utc()))
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::OAuth {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
