//! Translates protocol events into session state transitions and drives
//! bounded reconnection.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use {
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use wagate_protocol::{DisconnectReason, SessionEvent, qr};

use crate::{
    registry::SessionRegistry,
    session::{Session, SessionStatus},
};

/// Automatic reconnection gives up after this many consecutive
/// failures; a successful connect resets the count.
pub const MAX_RECONNECT_ATTEMPTS: u8 = 3;

/// Fixed delay before a reconnection attempt. Deliberately not
/// exponential; revisit if flapping connections become a problem.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

// ── Event pump ───────────────────────────────────────────────────────────────

/// Spawn the event pump for one connection generation. Holds the
/// registry weakly so a pump never keeps it alive; runs until the
/// engine closes its event channel.
pub(crate) fn spawn_pump(
    registry: Weak<SessionRegistry>,
    key: String,
    conn_seq: u64,
    mut events: mpsc::Receiver<SessionEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            apply_event(&registry, &key, conn_seq, event);
        }
        debug!(key, conn_seq, "event stream closed");
    });
}

/// Apply one lifecycle event to the session it belongs to.
///
/// Events for a key no longer present (evicted) or carrying a stale
/// generation (handle since replaced) are dropped: eviction is final
/// and no event may resurrect an entry.
pub(crate) fn apply_event(
    registry: &Arc<SessionRegistry>,
    key: &str,
    conn_seq: u64,
    event: SessionEvent,
) {
    let reconnect = {
        #[allow(clippy::unwrap_used)]
        let mut inner = registry.inner.lock().unwrap();
        let Some(session) = inner.entries.get_mut(key) else {
            debug!(key, "event for evicted session dropped");
            return;
        };
        if session.conn_seq != conn_seq {
            debug!(key, conn_seq, "event for stale connection dropped");
            return;
        }
        session.touch();

        match event {
            SessionEvent::PairingCode { code } => {
                session.status = SessionStatus::QrPending;
                match qr::data_url(&code) {
                    Ok(url) => session.pairing_artifact = Some(url),
                    Err(e) => warn!(key, error = %e, "pairing artifact render failed"),
                }
                info!(key, "pairing code issued");
                false
            },
            SessionEvent::Connected { identity } => {
                info!(key, phone = %identity, "session connected");
                session.status = SessionStatus::Connected;
                session.pairing_artifact = None;
                session.identity = Some(identity);
                session.reconnect_attempts = 0;
                false
            },
            SessionEvent::Disconnected { reason } => {
                session.status = SessionStatus::Disconnected;
                decide_reconnect(session, reason)
            },
        }
    };

    if reconnect {
        schedule_reconnect(registry.self_ref.clone(), key.to_string(), conn_seq);
    }
}

// ── Reconnection ─────────────────────────────────────────────────────────────

/// Consult the reason policy and the per-session bound. Increments the
/// attempt counter when a retry will be scheduled; permanently disarms
/// the session once the bound is crossed.
fn decide_reconnect(session: &mut Session, reason: DisconnectReason) -> bool {
    if !reason.should_reconnect() {
        info!(key = %session.key, ?reason, "disconnect is permanent, not reconnecting");
        return false;
    }
    if !session.allow_reconnect {
        debug!(key = %session.key, "reconnection disabled for session");
        return false;
    }
    if session.reconnect_attempts >= MAX_RECONNECT_ATTEMPTS {
        warn!(
            key = %session.key,
            attempts = session.reconnect_attempts,
            "reconnect attempts exhausted, disabling reconnection"
        );
        session.allow_reconnect = false;
        return false;
    }
    session.reconnect_attempts += 1;
    debug!(
        key = %session.key,
        attempt = session.reconnect_attempts,
        ?reason,
        "scheduling reconnect"
    );
    true
}

/// Wait out the backoff, then re-open the connection, provided the
/// session is still present, still allowed to reconnect, and the
/// generation that scheduled us has not been superseded in the
/// meantime (eviction, explicit re-connect).
fn schedule_reconnect(registry: Weak<SessionRegistry>, key: String, scheduled_seq: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(RECONNECT_BACKOFF).await;

        let Some(registry) = registry.upgrade() else {
            return;
        };

        let still_armed = |session: &Session| {
            session.allow_reconnect && session.conn_seq == scheduled_seq
        };

        {
            #[allow(clippy::unwrap_used)]
            let inner = registry.inner.lock().unwrap();
            match inner.entries.get(&key) {
                Some(session) if still_armed(session) => {},
                _ => {
                    debug!(key, "reconnect cancelled, session evicted or superseded");
                    return;
                },
            }
        }

        let opened = match registry.adapter.open(&key).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(key, error = %e, "reconnect open failed");
                return;
            },
        };

        #[allow(clippy::unwrap_used)]
        let mut inner = registry.inner.lock().unwrap();
        // Re-check: an evict or explicit connect may have raced the open.
        if !inner.entries.get(&key).is_some_and(|s| still_armed(s)) {
            opened.handle.terminate();
            debug!(key, "reconnect result discarded, superseded during open");
            return;
        }
        info!(key, "reconnecting session");
        registry.install_locked(&mut inner, &key, opened);
    });
}
