use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use {
    thiserror::Error,
    tokio::{sync::watch, time::Instant},
    tracing::{debug, info, warn},
};

use wagate_protocol::{AdapterError, Jid, ProtocolAdapter, ProtocolSession};

use crate::{
    lifecycle,
    session::{Session, SessionStatus, SessionView},
};

// ── Config & errors ──────────────────────────────────────────────────────────

/// Limits governing registry size and idle eviction.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hard cap on concurrently managed sessions.
    pub max_sessions: usize,
    /// Idle time after which a session becomes eligible for eviction.
    pub idle_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            idle_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session is not connected")]
    NotConnected,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

// ── Internal state ───────────────────────────────────────────────────────────

/// Outcome published to callers waiting on an in-flight creation.
type CreateOutcome = Option<Result<SessionView, String>>;

#[derive(Default)]
pub(crate) struct Inner {
    pub(crate) entries: HashMap<String, Session>,
    /// Keys with an in-flight creation; the watch settles when the
    /// creator publishes its outcome (or gives up).
    pub(crate) pending: HashMap<String, watch::Receiver<CreateOutcome>>,
    /// Generation source for connection handles.
    next_seq: u64,
}

/// What `ensure` decided to do for a key, resolved under one lock hold.
enum Claim {
    Wait(watch::Receiver<CreateOutcome>),
    Create(watch::Sender<CreateOutcome>),
}

/// Removes the in-flight marker if the creating future is dropped
/// before it settles, so waiters can take over instead of spinning.
struct PendingGuard<'a> {
    registry: &'a SessionRegistry,
    key: &'a str,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed
            && let Ok(mut inner) = self.registry.inner.lock()
        {
            inner.pending.remove(self.key);
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Bounded, TTL-evicting store of live session handles.
///
/// The single shared mutable structure of the gateway. The inner lock
/// is never held across an await: adapter opens, reconnect backoffs,
/// and HTTP handling all happen outside it.
pub struct SessionRegistry {
    pub(crate) inner: Mutex<Inner>,
    pub(crate) adapter: Arc<dyn ProtocolAdapter>,
    pub(crate) config: RegistryConfig,
    pub(crate) self_ref: Weak<Self>,
}

impl SessionRegistry {
    pub fn new(adapter: Arc<dyn ProtocolAdapter>, config: RegistryConfig) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            inner: Mutex::new(Inner::default()),
            adapter,
            config,
            self_ref: self_ref.clone(),
        })
    }

    // Lock poisoning only happens on a panic mid-mutation; there is
    // nothing sensible to salvage at that point.
    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Return the live entry for `key`, creating it if absent.
    ///
    /// Concurrent calls for the same new key collapse into one adapter
    /// open: the first caller claims an in-flight marker, later callers
    /// wait on its watch channel and adopt the same outcome.
    pub async fn ensure(&self, key: &str) -> Result<SessionView, RegistryError> {
        loop {
            let claim = {
                let mut inner = self.lock();
                if let Some(session) = inner.entries.get_mut(key) {
                    session.touch();
                    return Ok(session.view());
                }
                if let Some(rx) = inner.pending.get(key) {
                    Claim::Wait(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    inner.pending.insert(key.to_string(), rx);
                    Claim::Create(tx)
                }
            };
            match claim {
                Claim::Wait(mut rx) => {
                    let _ = rx.changed().await;
                    let outcome = rx.borrow().clone();
                    match outcome {
                        Some(Ok(view)) => return Ok(view),
                        Some(Err(msg)) => {
                            return Err(RegistryError::Adapter(AdapterError::OpenFailed(msg)));
                        },
                        // Creator vanished without publishing; retry.
                        None => continue,
                    }
                },
                Claim::Create(tx) => return self.create(key, tx).await,
            }
        }
    }

    async fn create(
        &self,
        key: &str,
        tx: watch::Sender<CreateOutcome>,
    ) -> Result<SessionView, RegistryError> {
        let mut guard = PendingGuard {
            registry: self,
            key,
            armed: true,
        };
        let opened = self.adapter.open(key).await;

        let mut inner = self.lock();
        guard.armed = false;
        inner.pending.remove(key);

        match opened {
            Ok(session) => {
                let view = self.install_locked(&mut inner, key, session);
                let _ = tx.send(Some(Ok(view.clone())));
                Ok(view)
            },
            Err(e) => {
                warn!(key, error = %e, "connection open failed");
                let _ = tx.send(Some(Err(e.to_string())));
                Err(e.into())
            },
        }
    }

    /// Install a freshly opened connection under `key`, evicting the
    /// least-recently-active entry first when at capacity. When the key
    /// already has an entry (reconnect), its handle is released and its
    /// identity, attempt counter, and reconnect arm carry over.
    pub(crate) fn install_locked(
        &self,
        inner: &mut Inner,
        key: &str,
        opened: ProtocolSession,
    ) -> SessionView {
        if !inner.entries.contains_key(key)
            && inner.entries.len() >= self.config.max_sessions
            && let Some(lru) = inner
                .entries
                .values()
                .min_by_key(|s| s.last_activity)
                .map(|s| s.key.clone())
        {
            info!(evicted = %lru, "session capacity reached, evicting least-recently-active");
            evict_locked(inner, &lru);
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let ProtocolSession { handle, events } = opened;

        let mut session = Session::new(key.to_string(), handle, seq);
        if let Some(old) = inner.entries.remove(key) {
            old.handle.terminate();
            session.identity = old.identity;
            session.reconnect_attempts = old.reconnect_attempts;
            session.allow_reconnect = old.allow_reconnect;
        }
        let view = session.view();
        inner.entries.insert(key.to_string(), session);

        lifecycle::spawn_pump(self.self_ref.clone(), key.to_string(), seq, events);
        view
    }

    /// Non-creating lookup; refreshes activity on hit.
    pub fn view(&self, key: &str) -> Option<SessionView> {
        let mut inner = self.lock();
        inner.entries.get_mut(key).map(|session| {
            session.touch();
            session.view()
        })
    }

    /// Send a text message through a connected session.
    ///
    /// The status gate runs before the wire engine is contacted: a key
    /// that is absent or not `Connected` fails fast.
    pub async fn send_text(&self, key: &str, to: &Jid, text: &str) -> Result<(), RegistryError> {
        let handle = {
            let mut inner = self.lock();
            let Some(session) = inner.entries.get_mut(key) else {
                return Err(RegistryError::NotConnected);
            };
            if session.status != SessionStatus::Connected {
                return Err(RegistryError::NotConnected);
            }
            session.touch();
            Arc::clone(&session.handle)
        };
        handle.send_text(to, text).await?;
        Ok(())
    }

    /// Explicitly evict `key`. Returns whether an entry was removed.
    pub fn evict(&self, key: &str) -> bool {
        let mut inner = self.lock();
        evict_locked(&mut inner, key)
    }

    /// Evict every entry idle longer than the configured TTL. Returns
    /// the number evicted.
    pub fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|s| now.duration_since(s.last_activity) > self.config.idle_ttl)
            .map(|s| s.key.clone())
            .collect();
        for key in &expired {
            evict_locked(&mut inner, key);
        }
        expired.len()
    }

    /// Active session count.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_sessions(&self) -> usize {
        self.config.max_sessions
    }
}

/// Disarm reconnection, release the handle, and drop the entry.
/// Synchronous so it can run under the registry lock before a
/// replacement is inserted.
pub(crate) fn evict_locked(inner: &mut Inner, key: &str) -> bool {
    let Some(mut session) = inner.entries.remove(key) else {
        return false;
    };
    session.allow_reconnect = false;
    session.handle.terminate();
    debug!(key, "session evicted");
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::FakeAdapter;

    fn config(max: usize, ttl_secs: u64) -> RegistryConfig {
        RegistryConfig {
            max_sessions: max,
            idle_ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ensure_is_single_flight() {
        let adapter = FakeAdapter::with_delay(Duration::from_millis(100));
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 3600));

        let r1 = Arc::clone(&registry);
        let r2 = Arc::clone(&registry);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { r1.ensure("alice").await }),
            tokio::spawn(async move { r2.ensure("alice").await }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        assert_eq!(adapter.opens(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_returns_existing_entry() {
        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 3600));

        registry.ensure("alice").await.unwrap();
        registry.ensure("alice").await.unwrap();
        assert_eq!(adapter.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_propagates_and_clears_pending() {
        let adapter = FakeAdapter::failing_for(&["broken"]);
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 3600));

        assert!(registry.ensure("broken").await.is_err());
        assert_eq!(registry.len(), 0);
        // Pending marker is gone; a later attempt opens again.
        assert!(registry.ensure("broken").await.is_err());
        assert_eq!(adapter.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_active() {
        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(2, 3600));

        registry.ensure("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        registry.ensure("b").await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touch "a" so "b" becomes the oldest.
        registry.view("a").unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        registry.ensure("c").await.unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.view("b").is_none());
        assert!(registry.view("a").is_some());
        assert!(adapter.handle_for("b").await.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_releases_handle() {
        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 3600));

        registry.ensure("alice").await.unwrap();
        assert!(registry.evict("alice"));
        assert!(!registry.evict("alice"));
        assert!(registry.view("alice").is_none());
        assert!(adapter.handle_for("alice").await.is_terminated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_text_requires_connected_without_touching_adapter() {
        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 3600));

        registry.ensure("alice").await.unwrap();
        let to = Jid::normalize("15551234").unwrap();

        // Still connecting: gate fires first.
        let err = registry.send_text("alice", &to, "hi").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotConnected));
        assert_eq!(adapter.handle_for("alice").await.sent(), 0);

        // Unknown key behaves the same.
        let err = registry.send_text("ghost", &to, "hi").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_idle_honors_ttl_boundary() {
        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, config(10, 60));

        registry.ensure("old").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        registry.ensure("fresh").await.unwrap();
        // "old" is now idle 61s (> ttl), "fresh" 31s (< ttl).
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(registry.sweep_idle(), 1);
        assert!(registry.view("old").is_none());
        assert!(registry.view("fresh").is_some());
        assert!(adapter.handle_for("old").await.is_terminated());
    }
}
