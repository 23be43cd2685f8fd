//! In-process loopback driver implementing the adapter seam.
//!
//! Stands in for a real wire engine in local development: unpaired keys
//! receive a pairing code and "pair" after a short delay, persisting a
//! credential record; already-paired keys connect immediately. Outbound
//! sends are logged and dropped.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    rand::{Rng, distr::Alphanumeric},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    adapter::{
        AdapterError, EVENT_CHANNEL_CAPACITY, ProtocolAdapter, ProtocolHandle, ProtocolSession,
    },
    creds::{CredentialRecord, CredentialStore},
    event::{DisconnectReason, SessionEvent},
    jid::Jid,
};

/// Pairing payloads are 20 alphanumeric characters, mirroring the
/// short-lived codes real engines issue.
const PAIRING_CODE_LEN: usize = 20;

pub struct LoopbackAdapter {
    store: CredentialStore,
    /// Delay between issuing a pairing code and the simulated scan.
    pair_delay: Duration,
}

impl LoopbackAdapter {
    pub fn new(store: CredentialStore) -> Self {
        Self {
            store,
            pair_delay: Duration::from_secs(2),
        }
    }

    pub fn with_pair_delay(mut self, delay: Duration) -> Self {
        self.pair_delay = delay;
        self
    }
}

/// Stable fake phone identity for a key.
fn identity_for(key: &str) -> String {
    let suffix = key
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)))
        % 1_000_000;
    format!("1555{suffix:06}@s.whatsapp.net")
}

#[async_trait]
impl ProtocolAdapter for LoopbackAdapter {
    async fn open(&self, key: &str) -> Result<ProtocolSession, AdapterError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let handle = Arc::new(LoopbackHandle {
            key: key.to_string(),
            cancel: cancel.clone(),
        });

        match self.store.load(key)? {
            Some(record) => {
                // Already paired: connect straight away.
                let identity = record.identity;
                tokio::spawn(async move {
                    let _ = tx.send(SessionEvent::Connected { identity }).await;
                });
            },
            None => {
                let code: String = rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(PAIRING_CODE_LEN)
                    .map(char::from)
                    .collect();
                let store = self.store.clone();
                let key = key.to_string();
                let delay = self.pair_delay;
                tokio::spawn(async move {
                    if tx.send(SessionEvent::PairingCode { code }).await.is_err() {
                        return;
                    }
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(delay) => {},
                    }
                    let identity = identity_for(&key);
                    let record = CredentialRecord {
                        identity: identity.clone(),
                        material: serde_json::json!({ "driver": "loopback" }),
                    };
                    if let Err(e) = store.save(&key, &record) {
                        warn!(key, error = %e, "loopback pairing could not persist credentials");
                        let _ = tx
                            .send(SessionEvent::Disconnected {
                                reason: DisconnectReason::BadSession,
                            })
                            .await;
                        return;
                    }
                    let _ = tx.send(SessionEvent::Connected { identity }).await;
                });
            },
        }

        Ok(ProtocolSession { handle, events: rx })
    }
}

struct LoopbackHandle {
    key: String,
    cancel: CancellationToken,
}

#[async_trait]
impl ProtocolHandle for LoopbackHandle {
    async fn send_text(&self, to: &Jid, text: &str) -> Result<(), AdapterError> {
        if self.cancel.is_cancelled() {
            return Err(AdapterError::SendFailed("connection terminated".into()));
        }
        info!(key = %self.key, to = %to, chars = text.chars().count(), "loopback send");
        Ok(())
    }

    fn terminate(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unpaired_key_pairs_then_connects() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let adapter = LoopbackAdapter::new(store.clone());

        let mut session = adapter.open("alice").await.unwrap();
        assert!(matches!(
            session.events.recv().await,
            Some(SessionEvent::PairingCode { .. })
        ));
        match session.events.recv().await {
            Some(SessionEvent::Connected { identity }) => {
                assert!(identity.ends_with("@s.whatsapp.net"));
            },
            other => panic!("expected connected, got {other:?}"),
        }
        assert!(store.load("alice").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paired_key_connects_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store
            .save("bob", &CredentialRecord {
                identity: "1555000001@s.whatsapp.net".into(),
                material: serde_json::Value::Null,
            })
            .unwrap();

        let adapter = LoopbackAdapter::new(store);
        let mut session = adapter.open("bob").await.unwrap();
        assert_eq!(
            session.events.recv().await,
            Some(SessionEvent::Connected {
                identity: "1555000001@s.whatsapp.net".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_aborts_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let adapter = LoopbackAdapter::new(store.clone());

        let mut session = adapter.open("carol").await.unwrap();
        assert!(matches!(
            session.events.recv().await,
            Some(SessionEvent::PairingCode { .. })
        ));
        session.handle.terminate();
        // Channel closes without ever connecting; no credentials appear.
        assert_eq!(session.events.recv().await, None);
        assert!(store.load("carol").unwrap().is_none());
    }
}
