use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;
use uuid::Uuid;

use lixi_types::events::ServerEvent;

/// Identifies one live WebSocket connection.
pub type ConnId = Uuid;

/// Outbound queue for one connection. Frames are pre-serialized JSON.
pub type Outbox = mpsc::UnboundedReceiver<Utf8Bytes>;

/// Tracks every connected client and fans events out to them.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// conn_id -> outbound queue drained by that connection's writer task
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<Utf8Bytes>>>,
}

fn encode(event: &ServerEvent) -> Option<Utf8Bytes> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            warn!("Failed to encode server event: {}", e);
            None
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. Returns (conn_id, outbox).
    pub async fn register(&self) -> (ConnId, Outbox) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Forget a connection. Unknown ids are ignored.
    pub async fn deregister(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Queue an event for a single connection. Returns false if it is gone.
    pub async fn send_to(&self, conn_id: ConnId, event: &ServerEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let connections = self.inner.connections.read().await;
        connections
            .get(&conn_id)
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Queue an event for every connection except `exclude`.
    ///
    /// Connections whose writer has already gone away are skipped. Returns
    /// how many connections the event was queued on.
    pub async fn broadcast(&self, event: &ServerEvent, exclude: Option<ConnId>) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        let connections = self.inner.connections.read().await;

        let mut delivered = 0;
        for (&conn_id, tx) in connections.iter() {
            if Some(conn_id) == exclude {
                continue;
            }
            if tx.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
