//! MCP Session Gateway - session-tracking HTTP front end for MCP servers.
//!
//! One listener exposes an MCP server to remote clients:
//!
//! - **transport**: SSE and streamable HTTP transports with per-kind session registries
//! - **auth**: Delegated OAuth2 login and bearer token enforcement
//! - **config**: Configuration from environment variables
//! - **server**: Router assembly, public health and auth status routes, serve loop
//! - **bootstrap**: Tracing initialization
//!
//! # Features
//!
//! - `auth` - OAuth2 login gateway and bearer middleware (enabled by default)
//! - `config` - Configuration utilities (enabled by default)
//! - `transport` - Session transports (enabled by default)
//! - `bootstrap` - Tracing setup (enabled by default)
//! - `full` - All features
//!
//! The `server` module requires both `auth` and `transport`.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_session_gateway::{init_tracing, shutdown_signal, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     init_tracing("mcp_session_gateway=debug,info");
//!
//!     let gateway = Gateway::from_env(|transport| async move {
//!         let server = tokio::spawn(MyServer::new().serve(transport));
//!         Ok::<_, BoxError>(Box::new(server) as Box<dyn ServerInstance>)
//!     });
//!     gateway.bind(shutdown_signal()).await
//! }
//! ```

pub mod error;
pub mod routes;

#[cfg(feature = "auth")]
pub mod auth;

#[cfg(feature = "config")]
pub mod config;

#[cfg(feature = "transport")]
pub mod transport;

#[cfg(all(feature = "auth", feature = "transport"))]
pub mod server;

#[cfg(feature = "bootstrap")]
pub mod bootstrap;

// Re-exports for convenience
pub use error::{GatewayError, OAuthError};

#[cfg(feature = "auth")]
pub use auth::{BearerAuthLayer, BearerAuthService, Identity, OAuthGateway, RequestContext};

#[cfg(feature = "config")]
pub use config::{BaseConfig, OAuthConfig};

#[cfg(feature = "transport")]
pub use transport::{
    BoxError, ServerInstance, SessionFactory, SessionRegistry, SessionTransport, TransportKind,
};

#[cfg(all(feature = "auth", feature = "transport"))]
pub use server::{shutdown_signal, Gateway};

#[cfg(feature = "bootstrap")]
pub use bootstrap::init_tracing;
