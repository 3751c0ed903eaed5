//! Session-tracking transports for MCP HTTP mode.
//!
//! Two independent transports share one listener: the SSE transport (GET to
//! open, POST with `?sessionId=`) and the streamable HTTP transport (session
//! id in the `mcp-session-id` header). Both keep their sessions in one
//! [`SessionRegistry`].

mod http;
mod registry;
pub(crate) mod session;
pub(crate) mod sse;
pub(crate) mod streamable;

pub use http::MAX_BODY_BYTES;
pub use registry::{SessionHandle, SessionRegistry, TransportKind};
pub use session::{BoxError, ServerInstance, SessionFactory, SessionId, SessionTransport};
