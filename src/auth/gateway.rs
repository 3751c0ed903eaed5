//! Delegated OAuth2 login.
//!
//! `GET /oauth/login` redirects to the identity provider. The provider sends
//! the browser back to `GET /oauth/callback` with a short-lived code, which is
//! exchanged for an access token, resolved to a profile, checked against the
//! allowed email domain and turned into a bearer token.
//!
//! The `state` nonce is sent with every redirect but is not stored, so the
//! callback cannot compare it. Closing that gap needs the nonce persisted
//! against the originating login attempt.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::token::{mint_token, Identity, TOKEN_TTL_SECS};
use crate::config::OAuthConfig;
use crate::error::{method_not_allowed, GatewayError, OAuthError};
use crate::routes::{CALLBACK_PATH, LOGIN_PATH};

/// Generate a random URL-safe `state` nonce (32 bytes of entropy).
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Redirect URL for one login attempt.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token endpoint response. Only the access token is used.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Profile of the authenticated subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

impl UserInfo {
    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Raw profile document as returned by the provider.
#[derive(Debug, Deserialize)]
struct ProfileResponse {
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    verified_email: Option<bool>,
}

impl From<ProfileResponse> for UserInfo {
    fn from(profile: ProfileResponse) -> Self {
        Self {
            email: profile.email,
            name: profile.name,
            picture: profile.picture,
            verified: profile.verified_email,
        }
    }
}

/// Successful callback response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserInfo,
}

/// OAuth2 client plus the login/callback/challenge behavior built on it.
pub struct OAuthGateway {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthGateway {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build a fresh redirect to the provider's authorization endpoint.
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let state = generate_state();
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("access_type", "offline");

        AuthorizationRequest {
            url: url.into(),
            state,
        }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// [`OAuthError::Exchange`] on a non-2xx answer, [`OAuthError::Http`] on
    /// network or decoding failure.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(OAuthError::Exchange { status, detail });
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Fetch the subject's profile with an access token.
    ///
    /// # Errors
    ///
    /// [`OAuthError::Profile`] on a non-2xx answer, [`OAuthError::Http`] on
    /// network or decoding failure.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserInfo, OAuthError> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Profile {
                status: response.status().as_u16(),
            });
        }
        let profile = response.json::<ProfileResponse>().await?;
        Ok(profile.into())
    }

    /// True when `email` belongs to the allowed organization.
    pub fn is_allowed(&self, email: &str) -> bool {
        email.ends_with(&self.config.allowed_domain)
    }

    /// Run the callback half of the flow for an authorization code.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Upstream`] when the provider calls fail,
    /// [`GatewayError::Forbidden`] when the subject's domain is not allowed.
    pub async fn complete_login(&self, code: &str) -> Result<TokenBundle, GatewayError> {
        let token = self.exchange_code(code).await?;
        let user = self.fetch_profile(&token.access_token).await?;

        if !self.is_allowed(&user.email) {
            tracing::warn!(email = %user.email, "OAuth2 login from unauthorized domain");
            return Err(GatewayError::Forbidden("Unauthorized domain".to_string()));
        }

        tracing::info!(email = %user.email, "OAuth2 login successful");
        Ok(TokenBundle {
            access_token: mint_token(&user.identity(), Utc::now()),
            token_type: "Bearer".to_string(),
            expires_in: TOKEN_TTL_SECS,
            user,
        })
    }

    /// 302 to the provider with a fresh nonce.
    pub fn login_redirect(&self) -> Response {
        let request = self.authorization_url();
        tracing::debug!(url = %request.url, "redirecting to identity provider");
        (StatusCode::FOUND, [(header::LOCATION, request.url)]).into_response()
    }

    /// Answer an unauthenticated request.
    ///
    /// Browsers are redirected into the login flow; other clients get a 401
    /// carrying the authorization URL so they can log in out of band.
    pub fn challenge(&self, headers: &HeaderMap) -> Response {
        if accepts_html(headers) {
            return self.login_redirect();
        }
        GatewayError::AuthRequired {
            authorization_url: self.authorization_url().url,
        }
        .into_response()
    }
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Public login and callback routes for a configured gateway.
pub fn oauth_routes<S>(gateway: Arc<OAuthGateway>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(LOGIN_PATH, get(login).fallback(method_not_allowed))
        .route(CALLBACK_PATH, get(callback).fallback(method_not_allowed))
        .with_state(gateway)
}

async fn login(State(gateway): State<Arc<OAuthGateway>>) -> Response {
    gateway.login_redirect()
}

/// First non-empty value of `name`; empty and repeated keys never fail.
fn callback_param(uri: &Uri, name: &str) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

async fn callback(
    State(gateway): State<Arc<OAuthGateway>>,
    uri: Uri,
) -> Result<Json<TokenBundle>, GatewayError> {
    let code = callback_param(&uri, "code")
        .ok_or_else(|| GatewayError::BadRequest("No code provided".to_string()))?;
    if callback_param(&uri, "state").is_none() {
        return Err(GatewayError::BadRequest("No state provided".to_string()));
    }

    gateway.complete_login(&code).await.map(Json)
}
