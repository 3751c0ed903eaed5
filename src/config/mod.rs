//! Configuration management with environment variable support.

mod base;
mod oauth;

pub use base::BaseConfig;
pub use oauth::{
    OAuthConfig, DEFAULT_ALLOWED_DOMAIN, DEFAULT_AUTH_URL, DEFAULT_SCOPES, DEFAULT_TOKEN_URL,
    DEFAULT_USERINFO_URL,
};
