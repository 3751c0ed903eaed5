//! Live sessions of both transport kinds.
//!
//! Each session pairs one transport handle with one server instance built by
//! the [`SessionFactory`]. Whoever removes the entry from the registry tears
//! the server down, so teardown happens exactly once no matter which side
//! (client disconnect, explicit close, server close, shutdown) gets there
//! first.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rmcp::{model::ClientJsonRpcMessage, service::TxJsonRpcMessage, RoleServer};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::session::{ServerInstance, SessionFactory, SessionId, SessionTransport};
use crate::error::GatewayError;

/// Which transport a session belongs to. Id spaces are independent per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Sse,
    Streamable,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sse => f.write_str("sse"),
            Self::Streamable => f.write_str("streamable"),
        }
    }
}

/// Gateway-side view of a live session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    kind: TransportKind,
    created_at: DateTime<Utc>,
    inbound: mpsc::Sender<ClientJsonRpcMessage>,
    events: Option<broadcast::Sender<Arc<Value>>>,
    closed: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Forward a client message to the server instance.
    pub(crate) async fn deliver(&self, message: ClientJsonRpcMessage) -> Result<(), GatewayError> {
        if self.inbound.send(message).await.is_err() {
            tracing::error!(session_id = %self.id, "failed to send message to session");
            return Err(GatewayError::Gone);
        }
        Ok(())
    }

    /// Subscribe to the server's outbound messages (streamable sessions only).
    pub(crate) fn subscribe(&self) -> Option<broadcast::Receiver<Arc<Value>>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }
}

struct Entry {
    handle: Arc<SessionHandle>,
    server: Box<dyn ServerInstance>,
}

#[derive(Default)]
struct Sessions {
    sse: HashMap<SessionId, Entry>,
    streamable: HashMap<SessionId, Entry>,
}

impl Sessions {
    fn of(&mut self, kind: TransportKind) -> &mut HashMap<SessionId, Entry> {
        match kind {
            TransportKind::Sse => &mut self.sse,
            TransportKind::Streamable => &mut self.streamable,
        }
    }
}

/// Session id to transport handle mapping for both transport kinds.
///
/// Lookup, insert and remove all happen under one lock, so no request can
/// observe a half-created or half-removed session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a session: allocate an id, build the server instance through
    /// `factory`, then publish the pair.
    ///
    /// Returns the handle and the receiver of the server's outbound messages.
    pub(crate) async fn open(
        self: &Arc<Self>,
        factory: &dyn SessionFactory,
        kind: TransportKind,
        events: Option<broadcast::Sender<Arc<Value>>>,
    ) -> Result<(Arc<SessionHandle>, mpsc::Receiver<TxJsonRpcMessage<RoleServer>>), GatewayError>
    {
        let id: SessionId = Arc::from(Uuid::new_v4().to_string());
        let closed = CancellationToken::new();
        let (transport, ends) = SessionTransport::pair(id.clone(), kind, closed.clone());

        let server = factory
            .create(transport)
            .await
            .map_err(|e| GatewayError::Internal(format!("session factory failed: {e}")))?;

        let handle = Arc::new(SessionHandle {
            id,
            kind,
            created_at: Utc::now(),
            inbound: ends.inbound,
            events,
            closed,
        });
        self.register(handle.clone(), server);
        Ok((handle, ends.outbound))
    }

    fn register(self: &Arc<Self>, handle: Arc<SessionHandle>, server: Box<dyn ServerInstance>) {
        let kind = handle.kind;
        let id = handle.id.clone();
        let closed = handle.closed.clone();

        self.sessions.lock().of(kind).insert(
            id.clone(),
            Entry {
                handle,
                server,
            },
        );
        tracing::info!(session_id = %id, %kind, "session opened");

        // Server-initiated close arrives as a cancelled token.
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Some(registry) = registry.upgrade() {
                registry.close(kind, &id);
            }
        });
    }

    pub fn get(&self, kind: TransportKind, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().of(kind).get(id).map(|e| e.handle.clone())
    }

    /// Close a session and tear down its server instance.
    ///
    /// Returns `false` when the session was already gone. Teardown errors are
    /// logged and otherwise ignored.
    pub fn close(&self, kind: TransportKind, id: &str) -> bool {
        let Some(entry) = self.sessions.lock().of(kind).remove(id) else {
            return false;
        };
        tracing::info!(session_id = %id, %kind, "session closed");
        shutdown(entry);
        true
    }

    /// Close every session, e.g. when the listener stops.
    pub fn close_all(&self) {
        let entries: Vec<Entry> = {
            let mut guard = self.sessions.lock();
            let sessions = &mut *guard;
            let sse = sessions.sse.drain().map(|(_, e)| e);
            let streamable = sessions.streamable.drain().map(|(_, e)| e);
            sse.chain(streamable).collect()
        };
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "closing all sessions");
        }
        entries.into_iter().for_each(shutdown);
    }

    pub fn len(&self, kind: TransportKind) -> usize {
        self.sessions.lock().of(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        let sessions = self.sessions.lock();
        sessions.sse.is_empty() && sessions.streamable.is_empty()
    }
}

fn shutdown(entry: Entry) {
    let Entry { handle, server } = entry;
    handle.closed.cancel();

    let session_id = handle.id.clone();
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = server.close().await {
                    tracing::warn!(%session_id, error = %e, "failed to close server instance");
                }
            });
        }
        Err(_) => {
            tracing::warn!(%session_id, "no runtime to close server instance, dropping it");
        }
    }
}

/// Closes its session when dropped.
///
/// Owned by the response stream of a session so that every way the stream
/// can end releases the session.
pub(crate) struct SessionGuard {
    registry: Weak<SessionRegistry>,
    kind: TransportKind,
    id: SessionId,
}

impl SessionGuard {
    pub(crate) fn new(registry: &Arc<SessionRegistry>, handle: &SessionHandle) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            kind: handle.kind,
            id: handle.id.clone(),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.close(self.kind, &self.id);
        }
    }
}
