//! Request classification.
//!
//! Routes are matched in this order:
//!
//! 1. `/health` and `/auth/status`, always public
//! 2. `/oauth/login` and `/oauth/callback`, public, only with a configured gateway
//! 3. `/mcp*`, streamable transport behind the bearer auth layer
//! 4. everything else, SSE transport behind the bearer auth layer

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::auth::{oauth_routes, BearerAuthLayer, OAuthGateway, RequestContext};
use crate::config::BaseConfig;
use crate::error::{method_not_allowed, GatewayError};
use crate::routes::{AUTH_STATUS_PATH, HEALTH_PATH, LOGIN_PATH, STREAMABLE_PREFIX};
use crate::transport::{sse, streamable, SessionFactory, SessionRegistry};

/// Shared state of the gateway router.
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<BaseConfig>,
    pub(crate) gateway: Option<Arc<OAuthGateway>>,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) factory: Arc<dyn SessionFactory>,
}

impl AppState {
    fn auth_type(&self) -> &'static str {
        if self.gateway.is_some() {
            "oauth2"
        } else {
            "iam"
        }
    }
}

/// Assemble the full router for `state`.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(HEALTH_PATH, get(health).fallback(method_not_allowed))
        .route(AUTH_STATUS_PATH, get(auth_status).fallback(method_not_allowed));

    if let Some(gateway) = &state.gateway {
        router = router.merge(oauth_routes(gateway.clone()));
    }

    let protected = Router::new()
        .fallback(dispatch)
        .layer(BearerAuthLayer::new(state.gateway.clone()));

    router.merge(protected).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "service": state.config.service_name,
        "auth": state.auth_type(),
    }))
}

async fn auth_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "auth_type": state.auth_type(),
        "auth_enabled": true,
        "login_url": state.gateway.as_ref().map(|_| LOGIN_PATH),
    }))
}

async fn dispatch(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    if let Some(identity) = request
        .extensions()
        .get::<RequestContext>()
        .and_then(RequestContext::identity)
    {
        tracing::debug!(email = %identity.email, path = %request.uri().path(), "dispatching");
    }

    if request.uri().path().starts_with(STREAMABLE_PREFIX) {
        streamable::handle(&state.sessions, state.factory.as_ref(), request).await
    } else {
        sse::handle(&state.sessions, state.factory.as_ref(), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{mint_token, Identity};
    use crate::config::OAuthConfig;
    use crate::routes::SESSION_ID_HEADER;
    use crate::transport::session::testing::{echo_factory, failing_factory, ping};
    use crate::transport::TransportKind;
    use axum::http::{header, StatusCode};
    use tower::util::ServiceExt;

    fn state(gateway: bool) -> AppState {
        state_with_factory(gateway, echo_factory())
    }

    fn state_with_factory(gateway: bool, factory: Arc<dyn SessionFactory>) -> AppState {
        AppState {
            config: Arc::new(BaseConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                service_name: "gateway-test".to_string(),
            }),
            gateway: gateway.then(|| {
                Arc::new(OAuthGateway::new(OAuthConfig::new(
                    "client",
                    "secret",
                    "http://127.0.0.1:3000/oauth/callback",
                )))
            }),
            sessions: SessionRegistry::new(),
            factory,
        }
    }

    fn token() -> String {
        let identity = Identity {
            email: "alice@hundredxinc.com".to_string(),
            name: "Alice".to_string(),
        };
        mint_token(&identity, Utc::now())
    }

    async fn call(
        app: Router,
        request: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type.starts_with("text/event-stream") {
            return (status, headers, Value::Null);
        }
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_mcp(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(ping(1).to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_without_gateway() {
        let (status, _, body) = call(build_router(state(false)), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "gateway-test");
        assert_eq!(body["auth"], "iam");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_auth_status_reports_mode() {
        let (status, _, body) = call(build_router(state(false)), get("/auth/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth_type"], "iam");
        assert_eq!(body["auth_enabled"], true);
        assert!(body["login_url"].is_null());

        let (status, _, body) = call(build_router(state(true)), get("/auth/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth_type"], "oauth2");
        assert_eq!(body["login_url"], "/oauth/login");
    }

    #[tokio::test]
    async fn test_public_routes_ignore_authorization_header() {
        for authorization in [None, Some("Bearer garbage"), Some("Basic abc")] {
            for path in ["/health", "/auth/status"] {
                let mut builder = Request::builder().uri(path);
                if let Some(value) = authorization {
                    builder = builder.header(header::AUTHORIZATION, value);
                }
                let request = builder.body(Body::empty()).unwrap();
                let (status, _, _) = call(build_router(state(true)), request).await;
                assert_eq!(status, StatusCode::OK, "{path} with {authorization:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_method_on_public_route() {
        let request = Request::builder()
            .method("POST")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(build_router(state(true)), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_leaves_transports_open() {
        let state = state(false);
        let sessions = state.sessions.clone();
        let app = build_router(state);

        let (status, headers, _) = call(app.clone(), post_mcp(None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(SESSION_ID_HEADER));

        let (status, _, _) = call(app, get("/sse")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sessions.len(TransportKind::Streamable), 1);
    }

    #[tokio::test]
    async fn test_login_routes_absent_without_gateway() {
        // Falls through to the SSE transport, like any other path.
        let (status, headers, _) = call(build_router(state(false)), get("/oauth/callback")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let state = state(true);
        let sessions = state.sessions.clone();
        let app = build_router(state);

        let (status, _, body) = call(app.clone(), post_mcp(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "authentication_required");
        assert!(body["authorization_url"].is_string());

        let (status, _, _) = call(app.clone(), post_mcp(Some("Bearer not-a-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = call(app.clone(), get("/sse")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(sessions.is_empty());

        let bearer = format!("Bearer {}", token());
        let (status, headers, body) = call(app, post_mcp(Some(&bearer))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key(SESSION_ID_HEADER));
        assert_eq!(body["id"], 1);
        assert_eq!(sessions.len(TransportKind::Streamable), 1);
    }

    #[tokio::test]
    async fn test_unknown_oauth_paths_are_protected() {
        let state = state(true);
        let sessions = state.sessions.clone();
        let app = build_router(state);

        for path in ["/oauth/anything", "/oauth/", "/oauth/login/extra"] {
            let (status, _, body) = call(app.clone(), get(path)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
            assert_eq!(body["error"], "authentication_required");
        }
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_browser_is_redirected_to_login() {
        let request = Request::builder()
            .uri("/sse")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = call(build_router(state(true)), request).await;
        assert_eq!(status, StatusCode::FOUND);
        assert!(headers[header::LOCATION]
            .to_str()
            .unwrap()
            .starts_with(crate::config::DEFAULT_AUTH_URL));
    }

    #[tokio::test]
    async fn test_login_route_with_gateway() {
        let (status, headers, _) = call(build_router(state(true)), get("/oauth/login")).await;
        assert_eq!(status, StatusCode::FOUND);
        assert!(headers.contains_key(header::LOCATION));

        let (status, _, body) = call(build_router(state(true)), get("/oauth/callback")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No code provided");
    }

    #[tokio::test]
    async fn test_sse_routing_by_method() {
        let bearer = format!("Bearer {}", token());
        let request = Request::builder()
            .method("POST")
            .uri("/sse")
            .header(header::AUTHORIZATION, bearer.as_str())
            .body(Body::from(ping(1).to_string()))
            .unwrap();
        let (status, _, _) = call(build_router(state(true)), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("PATCH")
            .uri("/")
            .header(header::AUTHORIZATION, bearer.as_str())
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = call(build_router(state(true)), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_factory_failure_is_internal_error() {
        let app = build_router(state_with_factory(false, failing_factory()));
        let (status, _, body) = call(app, get("/sse")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }
}
