//! Error taxonomy shared by the router, the session transports and the
//! OAuth gateway.
//!
//! Every variant renders as a JSON object with at least an `error` field.
//! Upstream and internal causes are logged server-side and never leaked to
//! the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure talking to the identity provider.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum OAuthError {
    /// The token endpoint rejected the authorization code.
    #[error("token exchange failed: {status} {detail}")]
    Exchange { status: u16, detail: String },

    /// The profile endpoint rejected the access token.
    #[error("failed to get user info: {status}")]
    Profile { status: u16 },

    #[cfg(feature = "auth")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors surfaced by gateway request handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required parameter is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The referenced session does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// No usable bearer token; the client must log in first.
    #[error("authentication_required")]
    AuthRequired { authorization_url: String },

    /// Authenticated subject is outside the allowed organization.
    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Upstream(#[from] OAuthError),

    /// The session exists but its inbound channel is closed.
    #[error("Session is closed")]
    Gone,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::AuthRequired { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Gone => StatusCode::GONE,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::AuthRequired { authorization_url } => json!({
                "error": "authentication_required",
                "authorization_url": authorization_url,
                "message": "Please authenticate using the provided authorization URL",
            }),
            Self::Upstream(cause) => {
                tracing::error!(error = %cause, "OAuth2 callback failed");
                json!({ "error": "Authentication failed" })
            }
            Self::Internal(cause) => {
                tracing::error!(error = %cause, "internal gateway error");
                json!({ "error": "Internal server error" })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Method fallback for routes that only serve some methods.
pub(crate) async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}
