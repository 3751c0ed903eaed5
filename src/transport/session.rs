//! Server-side end of a session and the factory seam that binds a protocol
//! server to it.

use std::{
    error::Error as StdError,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{future::BoxFuture, Sink, SinkExt, Stream, StreamExt};
use rmcp::{
    model::ClientJsonRpcMessage,
    service::{RxJsonRpcMessage, TxJsonRpcMessage},
    RoleServer,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, PollSender};

use super::registry::TransportKind;

pub type SessionId = Arc<str>;

pub type BoxError = Box<dyn StdError + Send + Sync>;

const CHANNEL_CAPACITY: usize = 64;

/// Transport handed to the protocol server for one session.
///
/// Implements both `Sink` and `Stream` so it can be served directly by an
/// rmcp service. Closing the sink ends the session.
pub struct SessionTransport {
    stream: ReceiverStream<RxJsonRpcMessage<RoleServer>>,
    sink: PollSender<TxJsonRpcMessage<RoleServer>>,
    session_id: SessionId,
    kind: TransportKind,
    closed: CancellationToken,
}

/// Gateway-side ends of the channels behind a [`SessionTransport`].
pub(crate) struct TransportEnds {
    pub(crate) inbound: mpsc::Sender<ClientJsonRpcMessage>,
    pub(crate) outbound: mpsc::Receiver<TxJsonRpcMessage<RoleServer>>,
}

impl SessionTransport {
    pub(crate) fn pair(
        session_id: SessionId,
        kind: TransportKind,
        closed: CancellationToken,
    ) -> (Self, TransportEnds) {
        let (from_client_tx, from_client_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_client_tx, to_client_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let transport = Self {
            stream: ReceiverStream::new(from_client_rx),
            sink: PollSender::new(to_client_tx),
            session_id,
            kind,
            closed,
        };
        let ends = TransportEnds {
            inbound: from_client_tx,
            outbound: to_client_rx,
        };
        (transport, ends)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

impl Sink<TxJsonRpcMessage<RoleServer>> for SessionTransport {
    type Error = std::io::Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.sink
            .poll_ready_unpin(cx)
            .map_err(std::io::Error::other)
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: TxJsonRpcMessage<RoleServer>,
    ) -> Result<(), Self::Error> {
        self.sink
            .start_send_unpin(item)
            .map_err(std::io::Error::other)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.sink
            .poll_flush_unpin(cx)
            .map_err(std::io::Error::other)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let result = self
            .sink
            .poll_close_unpin(cx)
            .map_err(std::io::Error::other);

        if result.is_ready() {
            tracing::debug!(session_id = %self.session_id, "server closed session transport");
            self.closed.cancel();
        }
        result
    }
}

impl Stream for SessionTransport {
    type Item = RxJsonRpcMessage<RoleServer>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

/// A running protocol server bound to one session.
pub trait ServerInstance: Send + 'static {
    /// Tear the server down. Called at most once, when its session closes.
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), BoxError>>;
}

/// A server running as its own task is torn down by aborting the task.
impl<T: Send + 'static> ServerInstance for tokio::task::JoinHandle<T> {
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), BoxError>> {
        Box::pin(async move {
            self.abort();
            match (*self).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Builds one protocol server per session.
///
/// Implemented for any `Fn(SessionTransport) -> Future` so a closure can be
/// used directly:
///
/// ```rust,ignore
/// let factory = |transport: SessionTransport| async move {
///     let server = tokio::spawn(async move { MyServer::new().serve(transport).await });
///     Ok(Box::new(server) as Box<dyn ServerInstance>)
/// };
/// ```
pub trait SessionFactory: Send + Sync + 'static {
    fn create(
        &self,
        transport: SessionTransport,
    ) -> BoxFuture<'static, Result<Box<dyn ServerInstance>, BoxError>>;
}

impl<F, Fut> SessionFactory for F
where
    F: Fn(SessionTransport) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn ServerInstance>, BoxError>> + Send + 'static,
{
    fn create(
        &self,
        transport: SessionTransport,
    ) -> BoxFuture<'static, Result<Box<dyn ServerInstance>, BoxError>> {
        Box::pin(self(transport))
    }
}
