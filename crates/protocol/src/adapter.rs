use std::sync::Arc;

use {async_trait::async_trait, thiserror::Error, tokio::sync::mpsc};

use crate::{event::SessionEvent, jid::Jid};

/// Buffer of the per-session lifecycle event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors surfaced across the adapter seam.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid session key: {0}")]
    InvalidKey(String),
    #[error("failed to open connection: {0}")]
    OpenFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("pairing artifact render failed: {0}")]
    Render(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ── Traits ───────────────────────────────────────────────────────────────────

/// A live, exclusively-owned protocol connection.
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
    /// Send a plain text message to `to`.
    async fn send_text(&self, to: &Jid, text: &str) -> Result<(), AdapterError>;

    /// Tear down the underlying connection. Synchronous and idempotent,
    /// so registry eviction can release the handle while holding its
    /// lock, before the entry is dropped.
    fn terminate(&self);
}

/// What an adapter returns for a freshly opened connection: the handle
/// plus the event stream the lifecycle controller consumes.
pub struct ProtocolSession {
    pub handle: Arc<dyn ProtocolHandle>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Boundary to the messaging wire engine.
///
/// Implementations read persisted credential state for `key`, open a
/// connection, persist credential updates as they arrive, and emit
/// lifecycle events in the order the engine produced them.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn open(&self, key: &str) -> Result<ProtocolSession, AdapterError>;
}
