//! Bearer token middleware for the protected transport routes.

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};
use chrono::Utc;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use super::gateway::OAuthGateway;
use super::token::{validate_token, Identity};
use crate::routes::is_public_path;

/// Request-scoped authentication result, inserted as a request extension.
///
/// `identity` is `None` when the gateway is not configured and the request
/// was let through on the platform's trust boundary.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
}

impl RequestContext {
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

/// Layer that requires a valid bearer token on non-public paths.
///
/// Without a gateway every request passes through unauthenticated.
///
/// # Example
///
/// ```rust,ignore
/// use mcp_session_gateway::BearerAuthLayer;
///
/// let router = Router::new()
///     .fallback(handler)
///     .layer(BearerAuthLayer::new(Some(gateway)));
/// ```
#[derive(Clone)]
pub struct BearerAuthLayer {
    gateway: Option<Arc<OAuthGateway>>,
}

impl BearerAuthLayer {
    pub fn new(gateway: Option<Arc<OAuthGateway>>) -> Self {
        Self { gateway }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            gateway: self.gateway.clone(),
        }
    }
}

/// Service that validates `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    gateway: Option<Arc<OAuthGateway>>,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let gateway = self.gateway.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(gateway) = gateway else {
                req.extensions_mut().insert(RequestContext::default());
                return inner.call(req).await;
            };

            if is_public_path(req.uri().path()) {
                return inner.call(req).await;
            }

            let identity = bearer_token(&req).and_then(|token| validate_token(token, Utc::now()));
            match identity {
                Some(identity) => {
                    tracing::debug!(email = %identity.email, "authenticated request");
                    req.extensions_mut()
                        .insert(RequestContext::authenticated(identity));
                    inner.call(req).await
                }
                None => Ok(gateway.challenge(req.headers())),
            }
        })
    }
}

/// Extract the token from a `Bearer <token>` header with exactly two parts.
fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Extension, Router};
    use chrono::Duration;
    use tower::util::ServiceExt;

    use crate::auth::token::mint_token;
    use crate::config::OAuthConfig;

    async fn whoami(ctx: Option<Extension<RequestContext>>) -> String {
        match ctx.as_ref().and_then(|Extension(ctx)| ctx.identity()) {
            Some(identity) => identity.email.clone(),
            None => "anonymous".to_string(),
        }
    }

    fn gateway() -> Arc<OAuthGateway> {
        Arc::new(OAuthGateway::new(OAuthConfig::new("c", "s", "http://x/cb")))
    }

    fn create_test_router(gateway: Option<Arc<OAuthGateway>>) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/health", get(whoami))
            .layer(BearerAuthLayer::new(gateway))
    }

    fn alice() -> Identity {
        Identity {
            email: "alice@hundredxinc.com".to_string(),
            name: "Alice".to_string(),
        }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_valid_bearer_token() {
        let app = create_test_router(Some(gateway()));
        let token = mint_token(&alice(), Utc::now());

        let request = Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "alice@hundredxinc.com");
    }

    #[tokio::test]
    async fn test_expired_bearer_token() {
        let app = create_test_router(Some(gateway()));
        let token = mint_token(&alice(), Utc::now() - Duration::hours(2));

        let request = Request::builder()
            .uri("/whoami")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_authorization_headers() {
        let token = mint_token(&alice(), Utc::now());
        for header_value in [
            token.clone(),
            format!("Basic {token}"),
            format!("bearer {token}"),
            format!("Bearer {token} extra"),
            "Bearer ".to_string(),
            "Bearer garbage".to_string(),
        ] {
            let request = Request::builder()
                .uri("/whoami")
                .header("Authorization", header_value.as_str())
                .body(Body::empty())
                .unwrap();
            let response = create_test_router(Some(gateway()))
                .oneshot(request)
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::UNAUTHORIZED,
                "accepted {header_value:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_no_auth_header_returns_challenge() {
        let app = create_test_router(Some(gateway()));
        let request = Request::builder().uri("/whoami").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "authentication_required");
        assert!(body["authorization_url"]
            .as_str()
            .unwrap()
            .contains("response_type=code"));
    }

    #[tokio::test]
    async fn test_browser_without_token_is_redirected() {
        let app = create_test_router(Some(gateway()));
        let request = Request::builder()
            .uri("/whoami")
            .header("Accept", "text/html")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_public_path_bypasses_auth() {
        let app = create_test_router(Some(gateway()));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_lets_everything_through() {
        let app = create_test_router(None);
        let request = Request::builder().uri("/whoami").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "anonymous");
    }
}
