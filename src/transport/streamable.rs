//! Streamable HTTP transport.
//!
//! - `POST` without `mcp-session-id` opens a session and handles the message
//! - `POST` with the header delivers a message to that session; requests are
//!   answered with the matching JSON-RPC response, everything else with 202
//! - `GET` with the header streams server-initiated messages as SSE
//! - `DELETE` with the header closes the session

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::StreamExt;
use rmcp::{model::ClientJsonRpcMessage, service::TxJsonRpcMessage, RoleServer};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_util::sync::CancellationToken;

use super::http::{client_message, read_json};
use super::registry::{SessionHandle, SessionRegistry, TransportKind};
use super::session::{SessionFactory, SessionId};
use crate::error::GatewayError;
use crate::routes::SESSION_ID_HEADER;

const EVENT_CAPACITY: usize = 64;

/// Serve one request on the streamable transport.
pub(crate) async fn handle(
    registry: &Arc<SessionRegistry>,
    factory: &dyn SessionFactory,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    let session_id = request
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let method = request.method().clone();

    let Some(session_id) = session_id else {
        if method != Method::POST {
            return Err(GatewayError::BadRequest("Invalid request".to_string()));
        }
        let value = read_json(request.into_body()).await?;
        let awaiting = request_id(&value);
        let message: ClientJsonRpcMessage = client_message(value)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (handle, outbound) = registry
            .open(factory, TransportKind::Streamable, Some(events.clone()))
            .await?;
        tracing::info!(session_id = %handle.id(), "new streamable HTTP session");
        spawn_fanout(outbound, events, handle.closed().clone(), handle.id());

        return post_message(&handle, message, awaiting).await;
    };

    let handle = registry
        .get(TransportKind::Streamable, &session_id)
        .ok_or_else(|| GatewayError::NotFound("Session not found".to_string()))?;

    match method {
        Method::POST => {
            let value = read_json(request.into_body()).await?;
            let awaiting = request_id(&value);
            let message: ClientJsonRpcMessage = client_message(value)?;
            post_message(&handle, message, awaiting).await
        }
        Method::GET => event_stream(&handle),
        Method::DELETE => {
            registry.close(TransportKind::Streamable, &session_id);
            Ok(with_session_id(
                StatusCode::NO_CONTENT.into_response(),
                handle.id(),
            ))
        }
        _ => Err(GatewayError::MethodNotAllowed),
    }
}

/// Copy the server's outbound messages onto the session's broadcast channel
/// until either side closes.
fn spawn_fanout(
    mut outbound: mpsc::Receiver<TxJsonRpcMessage<RoleServer>>,
    events: broadcast::Sender<Arc<Value>>,
    closed: CancellationToken,
    session_id: &str,
) {
    let session_id: SessionId = Arc::from(session_id);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    match serde_json::to_value(&message) {
                        // No subscriber means nobody is waiting for this message.
                        Ok(value) => {
                            let _ = events.send(Arc::new(value));
                        }
                        Err(e) => {
                            tracing::warn!(%session_id, error = %e, "dropping unserializable server message");
                        }
                    }
                }
                _ = closed.cancelled() => break,
            }
        }
        tracing::debug!(%session_id, "streamable session output ended");
        closed.cancel();
    });
}

async fn post_message(
    handle: &SessionHandle,
    message: ClientJsonRpcMessage,
    awaiting: Option<Value>,
) -> Result<Response, GatewayError> {
    let mut events = handle
        .subscribe()
        .ok_or_else(|| GatewayError::Internal("session has no event channel".to_string()))?;
    tracing::debug!(session_id = %handle.id(), ?message, "received client message");
    handle.deliver(message).await?;

    let Some(id) = awaiting else {
        return Ok(with_session_id(
            StatusCode::ACCEPTED.into_response(),
            handle.id(),
        ));
    };

    let value = await_response(&mut events, handle.closed(), &id).await?;
    let response = Json(value.as_ref().clone()).into_response();
    Ok(with_session_id(response, handle.id()))
}

/// Wait for the response whose id is `id`.
///
/// A lagged receiver may have skipped that response, so lagging fails the
/// request instead of waiting for a reply that never comes.
async fn await_response(
    events: &mut broadcast::Receiver<Arc<Value>>,
    closed: &CancellationToken,
    id: &Value,
) -> Result<Arc<Value>, GatewayError> {
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(value) if is_response(&value) && value.get("id") == Some(id) => return Ok(value),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(GatewayError::Internal(format!(
                        "response waiter lagged by {skipped} messages"
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(GatewayError::Gone),
            },
            _ = closed.cancelled() => return Err(GatewayError::Gone),
        }
    }
}

fn event_stream(handle: &SessionHandle) -> Result<Response, GatewayError> {
    let events = handle
        .subscribe()
        .ok_or_else(|| GatewayError::Internal("session has no event channel".to_string()))?;

    let stream = BroadcastStream::new(events)
        .filter_map(|event| {
            futures::future::ready(match event {
                Ok(value) if !is_response(&value) => Some(Ok::<_, Infallible>(
                    Event::default().event("message").data(value.to_string()),
                )),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                    None
                }
            })
        })
        .take_until(handle.closed().clone().cancelled_owned());

    let response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    Ok(with_session_id(response, handle.id()))
}

/// The id of a JSON-RPC request, `None` for notifications and responses.
fn request_id(value: &Value) -> Option<Value> {
    value.get("method")?;
    value.get("id").filter(|id| !id.is_null()).cloned()
}

fn is_response(value: &Value) -> bool {
    value.get("method").is_none() && (value.get("result").is_some() || value.get("error").is_some())
}

fn with_session_id(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_ID_HEADER), value);
    }
    response
}
