//! Server-Sent-Events transport.
//!
//! `GET` opens a session and streams server messages; the first event tells
//! the client where to `POST` its messages (`<path>?sessionId=<id>`).

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::{stream::BoxStream, Stream, StreamExt};
use rmcp::model::ClientJsonRpcMessage;
use tokio_stream::wrappers::ReceiverStream;

use super::http::{client_message, query_param, read_json};
use super::registry::{SessionGuard, SessionRegistry, TransportKind};
use super::session::SessionFactory;
use crate::error::GatewayError;

type EventStream = BoxStream<'static, Result<Event, std::io::Error>>;

/// Event stream that releases its session when dropped.
struct SessionStream {
    inner: EventStream,
    _guard: SessionGuard,
}

impl Stream for SessionStream {
    type Item = Result<Event, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Serve one request on the SSE transport.
pub(crate) async fn handle(
    registry: &Arc<SessionRegistry>,
    factory: &dyn SessionFactory,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    match *request.method() {
        Method::GET => open_stream(registry, factory, request.uri().path()).await,
        Method::POST => post_message(registry, request).await,
        _ => Err(GatewayError::MethodNotAllowed),
    }
}

async fn open_stream(
    registry: &Arc<SessionRegistry>,
    factory: &dyn SessionFactory,
    path: &str,
) -> Result<Response, GatewayError> {
    let (handle, outbound) = registry.open(factory, TransportKind::Sse, None).await?;
    tracing::info!(session_id = %handle.id(), "new SSE connection");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{path}?sessionId={}", handle.id()));

    let messages =
        ReceiverStream::new(outbound).map(|message| match serde_json::to_string(&message) {
            Ok(json) => Ok(Event::default().event("message").data(json)),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        });

    let inner = futures::stream::once(futures::future::ok(endpoint))
        .chain(messages)
        .take_until(handle.closed().clone().cancelled_owned())
        .boxed();

    let stream = SessionStream {
        inner,
        _guard: SessionGuard::new(registry, &handle),
    };
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn post_message(
    registry: &Arc<SessionRegistry>,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let session_id = query_param(request.uri(), "sessionId")
        .ok_or_else(|| GatewayError::BadRequest("Missing sessionId".to_string()))?;
    let handle = registry
        .get(TransportKind::Sse, &session_id)
        .ok_or_else(|| GatewayError::NotFound("Session not found".to_string()))?;

    let message: ClientJsonRpcMessage = client_message(read_json(request.into_body()).await?)?;
    tracing::debug!(session_id, ?message, "received client message");

    handle.deliver(message).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}
