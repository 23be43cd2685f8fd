use std::sync::Arc;

use {serde::Serialize, tokio::time::Instant};

use wagate_protocol::ProtocolHandle;

/// Connection state of a managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connecting,
    QrPending,
    Connected,
    Disconnected,
}

/// A live session entry.
///
/// Exclusively owns its protocol handle: the registry guarantees at
/// most one non-terminated handle per key at any instant.
pub(crate) struct Session {
    pub key: String,
    pub handle: Arc<dyn ProtocolHandle>,
    pub status: SessionStatus,
    /// Rendered QR data URL; only meaningful while pairing. Overwritten
    /// on each new code, cleared on connect.
    pub pairing_artifact: Option<String>,
    /// Protocol identity, set on first connect and sticky thereafter.
    pub identity: Option<String>,
    pub reconnect_attempts: u8,
    /// Once false, no lifecycle event may re-arm reconnection for this
    /// key; only an explicit connect revives it.
    pub allow_reconnect: bool,
    /// Updated on every read, write, and lifecycle event; drives TTL
    /// eviction.
    pub last_activity: Instant,
    /// Generation counter. Lifecycle events and scheduled reconnects
    /// carry the generation they were created under and are dropped
    /// once it no longer matches.
    pub conn_seq: u64,
}

impl Session {
    pub(crate) fn new(key: String, handle: Arc<dyn ProtocolHandle>, conn_seq: u64) -> Self {
        Self {
            key,
            handle,
            status: SessionStatus::Connecting,
            pairing_artifact: None,
            identity: None,
            reconnect_attempts: 0,
            allow_reconnect: true,
            last_activity: Instant::now(),
            conn_seq,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            phone: self.identity.clone(),
            qr: self.pairing_artifact.clone(),
        }
    }
}

/// Point-in-time snapshot of a session, served over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub phone: Option<String>,
    pub qr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let s = serde_json::to_string(&SessionStatus::QrPending).unwrap();
        assert_eq!(s, "\"qr_pending\"");
    }
}
