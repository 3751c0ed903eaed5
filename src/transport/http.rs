//! Request parsing shared by both transports.

use axum::{body::Body, http::Uri};
use serde_json::Value;

use crate::error::GatewayError;

/// Upper bound on a single JSON-RPC message body.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// First non-empty value of query parameter `name`.
pub(crate) fn query_param(uri: &Uri, name: &str) -> Option<String> {
    url::form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Read the body as one JSON document.
pub(crate) async fn read_json(body: Body) -> Result<Value, GatewayError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Failed to read body: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid JSON: {e}")))
}

/// Interpret a JSON document as a client JSON-RPC message.
pub(crate) fn client_message<T: serde::de::DeserializeOwned>(
    value: Value,
) -> Result<T, GatewayError> {
    serde_json::from_value(value)
        .map_err(|e| GatewayError::BadRequest(format!("Invalid JSON-RPC message: {e}")))
}
