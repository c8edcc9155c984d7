use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use lixi_store::{EnvelopeStore, OpenRejected, PersistError};
use lixi_types::api::CreateEnvelope;
use lixi_types::events::{ClientCommand, ServerEvent, resolve_opener};
use lixi_types::models::Envelope;

use crate::registry::{ConnId, Outbox, Registry};

/// Applies client commands to the ledger and fans the results out.
///
/// All store access goes through one mutex, and each mutation's broadcast is
/// queued before that mutex is released. Connections therefore observe
/// mutations in the order they were applied, and a new connection's `init`
/// is always consistent with the events queued after it.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Mutex<EnvelopeStore>,
    registry: Registry,
}

impl Engine {
    pub fn new(store: EnvelopeStore) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: Mutex::new(store),
                registry: Registry::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Register a connection and queue its `init` snapshot as the first
    /// frame it will receive.
    pub async fn connect(&self) -> (ConnId, Outbox) {
        let store = self.inner.store.lock().await;
        let (conn_id, outbox) = self.inner.registry.register().await;

        let init = ServerEvent::Init { envelopes: store.snapshot() };
        self.inner.registry.send_to(conn_id, &init).await;

        info!("Connection {} joined with {} envelopes", conn_id, store.len());
        (conn_id, outbox)
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        self.inner.registry.deregister(conn_id).await;
        info!("Connection {} left", conn_id);
    }

    /// Handle one inbound text frame. Malformed frames are dropped.
    pub async fn handle_text(&self, conn_id: ConnId, text: &str) {
        match ClientCommand::parse(text) {
            Ok(cmd) => self.handle_command(conn_id, cmd).await,
            Err(e) => {
                debug!(
                    "Connection {} sent bad frame: {} -- raw: {}",
                    conn_id,
                    e,
                    truncate(text, 200)
                );
            }
        }
    }

    pub async fn handle_command(&self, conn_id: ConnId, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Add {
                envelope_type,
                sender,
                content,
            } => {
                let req = CreateEnvelope {
                    kind: envelope_type,
                    sender,
                    content,
                };
                self.add(conn_id, req).await;
            }

            ClientCommand::Open {
                id,
                opened_by,
                receiver,
            } => {
                let opener = resolve_opener(opened_by, receiver);

                if let Err(reason) = self.open(conn_id, id, &opener).await {
                    debug!("Connection {}: open rejected: {}", conn_id, reason);
                }
            }
        }
    }

    /// Create an envelope and broadcast it to everyone but `origin`.
    pub async fn add(&self, origin: ConnId, req: CreateEnvelope) -> Envelope {
        let mut store = self.inner.store.lock().await;
        let envelope = store.create(req).await;

        let event = ServerEvent::Add { envelope: envelope.clone() };
        self.inner.registry.broadcast(&event, Some(origin)).await;
        envelope
    }

    /// Open an envelope and, if accepted, broadcast it to everyone but
    /// `origin`. Rejections are not broadcast.
    pub async fn open(
        &self,
        origin: ConnId,
        id: u64,
        opener: &str,
    ) -> Result<Envelope, OpenRejected> {
        let mut store = self.inner.store.lock().await;
        let envelope = store.open(id, opener).await?;

        let event = ServerEvent::Open { envelope: envelope.clone() };
        self.inner.registry.broadcast(&event, Some(origin)).await;
        Ok(envelope)
    }

    /// Current ledger, in insertion order.
    pub async fn snapshot(&self) -> Vec<Envelope> {
        self.inner.store.lock().await.snapshot()
    }

    /// Write the ledger to disk regardless of pending mutations.
    pub async fn flush(&self) -> Result<(), PersistError> {
        self.inner.store.lock().await.flush().await
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
