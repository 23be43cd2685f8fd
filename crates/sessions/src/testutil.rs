//! Scriptable adapter doubles shared by the crate's tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::sync::{Mutex, mpsc},
};

use wagate_protocol::{
    AdapterError, Jid, ProtocolAdapter, ProtocolHandle, ProtocolSession, SessionEvent,
};

pub(crate) struct OpenedConn {
    pub key: String,
    pub events: mpsc::Sender<SessionEvent>,
    pub handle: Arc<FakeHandle>,
}

/// Adapter double: every open succeeds (unless the key is scripted to
/// fail) and records the event sender + handle for the test to drive.
pub(crate) struct FakeAdapter {
    open_calls: AtomicUsize,
    fail_keys: Vec<String>,
    open_delay: Duration,
    opened: Mutex<Vec<OpenedConn>>,
}

impl FakeAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open_calls: AtomicUsize::new(0),
            fail_keys: Vec::new(),
            open_delay: Duration::ZERO,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Adapter whose opens take `delay` to complete.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            open_calls: AtomicUsize::new(0),
            fail_keys: Vec::new(),
            open_delay: delay,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Adapter that fails to open the given keys.
    pub fn failing_for(keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            open_calls: AtomicUsize::new(0),
            fail_keys: keys.iter().map(|k| (*k).to_string()).collect(),
            open_delay: Duration::ZERO,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opens(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Event sender of the most recent connection opened for `key`.
    pub async fn sender_for(&self, key: &str) -> mpsc::Sender<SessionEvent> {
        self.opened
            .lock()
            .await
            .iter()
            .rev()
            .find(|c| c.key == key)
            .map(|c| c.events.clone())
            .expect("no connection opened for key")
    }

    /// Handle of the most recent connection opened for `key`.
    pub async fn handle_for(&self, key: &str) -> Arc<FakeHandle> {
        self.opened
            .lock()
            .await
            .iter()
            .rev()
            .find(|c| c.key == key)
            .map(|c| Arc::clone(&c.handle))
            .expect("no connection opened for key")
    }
}

#[async_trait]
impl ProtocolAdapter for FakeAdapter {
    async fn open(&self, key: &str) -> Result<ProtocolSession, AdapterError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.fail_keys.iter().any(|k| k == key) {
            return Err(AdapterError::OpenFailed(format!(
                "scripted failure for {key}"
            )));
        }
        let (tx, rx) = mpsc::channel(32);
        let handle = Arc::new(FakeHandle::default());
        self.opened.lock().await.push(OpenedConn {
            key: key.to_string(),
            events: tx,
            handle: Arc::clone(&handle),
        });
        Ok(ProtocolSession { handle, events: rx })
    }
}

#[derive(Default)]
pub(crate) struct FakeHandle {
    sent: AtomicUsize,
    terminated: AtomicBool,
}

impl FakeHandle {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolHandle for FakeHandle {
    async fn send_text(&self, _to: &Jid, _text: &str) -> Result<(), AdapterError> {
        if self.is_terminated() {
            return Err(AdapterError::SendFailed("terminated".into()));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}
