//! Well-known paths served by the gateway.

/// Liveness probe, always public.
pub const HEALTH_PATH: &str = "/health";

/// Reports which authentication mode is active, always public.
pub const AUTH_STATUS_PATH: &str = "/auth/status";

/// Starts the delegated login flow.
pub const LOGIN_PATH: &str = "/oauth/login";

/// Identity provider redirect target.
pub const CALLBACK_PATH: &str = "/oauth/callback";

/// Every path below this prefix is served by the streamable HTTP transport.
pub const STREAMABLE_PREFIX: &str = "/mcp";

/// Header carrying the streamable session id in both directions.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Returns true for paths that never require a bearer token.
pub fn is_public_path(path: &str) -> bool {
    matches!(path, HEALTH_PATH | AUTH_STATUS_PATH | LOGIN_PATH | CALLBACK_PATH)
}
