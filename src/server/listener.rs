//! Gateway assembly and the serve loop.

use std::{future::Future, sync::Arc};

use axum::Router;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use super::router::{build_router, AppState};
use crate::auth::OAuthGateway;
use crate::config::{BaseConfig, OAuthConfig};
use crate::routes::{AUTH_STATUS_PATH, CALLBACK_PATH, HEALTH_PATH, LOGIN_PATH, STREAMABLE_PREFIX};
use crate::transport::{SessionFactory, SessionRegistry, TransportKind};

/// A configured gateway, ready to serve.
///
/// # Example
///
/// ```rust,ignore
/// use mcp_session_gateway::{shutdown_signal, Gateway};
///
/// let gateway = Gateway::from_env(|transport| async move {
///     Ok::<_, BoxError>(Box::new(tokio::spawn(run_server(transport))) as Box<dyn ServerInstance>)
/// });
/// gateway.bind(shutdown_signal()).await?;
/// ```
pub struct Gateway {
    state: AppState,
}

impl Gateway {
    pub fn new(
        config: BaseConfig,
        oauth: Option<OAuthConfig>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let gateway = oauth.map(|oauth| Arc::new(OAuthGateway::new(oauth)));
        Self::assemble(config, gateway, factory)
    }

    /// Read `BaseConfig` and the optional OAuth2 settings from the environment.
    pub fn from_env(factory: impl SessionFactory + 'static) -> Self {
        let config = BaseConfig::from_env();
        let oauth = OAuthConfig::from_env(&config);
        Self::new(config, oauth, Arc::new(factory))
    }

    /// Use a pre-built OAuth gateway, e.g. one with a custom HTTP client.
    pub fn with_oauth_gateway(
        config: BaseConfig,
        gateway: Arc<OAuthGateway>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self::assemble(config, Some(gateway), factory)
    }

    fn assemble(
        config: BaseConfig,
        gateway: Option<Arc<OAuthGateway>>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        match &gateway {
            Some(gateway) => info!(
                client_id = %gateway.config().client_id(),
                redirect_uri = %gateway.config().redirect_uri(),
                "OAuth2 authentication enabled"
            ),
            None => warn!("OAuth2 not configured, relying on platform IAM for access control"),
        }

        Self {
            state: AppState {
                config: Arc::new(config),
                gateway,
                sessions: SessionRegistry::new(),
                factory,
            },
        }
    }

    pub fn config(&self) -> &BaseConfig {
        &self.state.config
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.state.sessions
    }

    /// Whether the delegated OAuth2 login is configured.
    pub fn auth_enabled(&self) -> bool {
        self.state.gateway.is_some()
    }

    /// Bind `HOST:PORT` and serve until `shutdown` resolves.
    pub async fn bind(self, shutdown: impl Future<Output = ()> + Send + 'static) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.state.config.socket_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// All open sessions are closed once `shutdown` fires, so long-lived
    /// event streams end and the listener can drain.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let base = self.state.config.public_url();
        info!("============================================================");
        info!(service = %self.state.config.service_name, "listening on {}", listener.local_addr()?);
        info!("  GET  {base}/sse  (SSE stream)");
        info!("  POST {base}/sse?sessionId=<id>");
        info!("  POST {base}{STREAMABLE_PREFIX}  (streamable HTTP)");
        info!("  GET  {base}{HEALTH_PATH}");
        info!("  GET  {base}{AUTH_STATUS_PATH}");
        if self.auth_enabled() {
            info!("  GET  {base}{LOGIN_PATH}");
            info!("  GET  {base}{CALLBACK_PATH}");
        }
        info!("============================================================");

        let sessions = self.state.sessions.clone();
        let drain = sessions.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!(
                    sse = drain.len(TransportKind::Sse),
                    streamable = drain.len(TransportKind::Streamable),
                    "shutting down, closing sessions"
                );
                drain.close_all();
            })
            .await?;

        sessions.close_all();
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
