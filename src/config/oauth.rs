//! Delegated login configuration.

use std::fmt;

use url::Url;

use super::base::BaseConfig;
use crate::routes::CALLBACK_PATH;

/// Scopes requested from the identity provider.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

/// Authorization endpoint of the identity provider.
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Token endpoint of the identity provider.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Profile endpoint of the identity provider.
pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Only subjects whose email ends with this suffix may log in.
pub const DEFAULT_ALLOWED_DOMAIN: &str = "@hundredxinc.com";

/// OAuth2 client configuration, fixed for the lifetime of the process.
///
/// Built from the environment by [`OAuthConfig::from_env`]:
///
/// | Variable | Required | Description |
/// |----------|----------|-------------|
/// | `OAUTH2_CLIENT_ID` | yes | OAuth2 client id |
/// | `OAUTH2_CLIENT_SECRET` | yes | OAuth2 client secret |
/// | `OAUTH2_REDIRECT_URL` | no | Callback URL, defaults to `<public url>/oauth/callback` |
///
/// When either credential is missing there is no config at all, and the
/// gateway falls back to the platform's trust boundary.
#[derive(Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: String,
    pub(crate) scopes: Vec<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) allowed_domain: String,
}

impl OAuthConfig {
    /// Create a config with the default provider endpoints and policy.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: DEFAULT_AUTH_URL.parse().expect("valid default URL"),
            token_url: DEFAULT_TOKEN_URL.parse().expect("valid default URL"),
            userinfo_url: DEFAULT_USERINFO_URL.parse().expect("valid default URL"),
            allowed_domain: DEFAULT_ALLOWED_DOMAIN.to_string(),
        }
    }

    /// Read the config from the environment, `None` when credentials are absent.
    pub fn from_env(base: &BaseConfig) -> Option<Self> {
        Self::from_lookup(base, |key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(base: &BaseConfig, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let present = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let client_id = present("OAUTH2_CLIENT_ID")?;
        let client_secret = present("OAUTH2_CLIENT_SECRET")?;
        let redirect_uri = present("OAUTH2_REDIRECT_URL")
            .unwrap_or_else(|| format!("{}{}", base.public_url(), CALLBACK_PATH));

        Some(Self::new(client_id, client_secret, redirect_uri))
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the profile endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Override the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Override the allowed email suffix, e.g. `@example.com`.
    #[must_use]
    pub fn with_allowed_domain(mut self, suffix: impl Into<String>) -> Self {
        self.allowed_domain = suffix.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    pub fn allowed_domain(&self) -> &str {
        &self.allowed_domain
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .field("allowed_domain", &self.allowed_domain)
            .finish()
    }
}
