//! Periodic idle-session eviction.

use std::{sync::Arc, time::Duration};

use {
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::registry::SessionRegistry;

/// Spawn the recurring sweep task. Cancel the token to stop it.
///
/// Each run operates on a point-in-time snapshot inside the registry
/// and only evicts entries still present, so it never blocks `ensure`
/// calls arriving mid-sweep.
pub fn spawn(
    registry: Arc<SessionRegistry>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so a sweep never
        // races startup recovery.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("cleanup scheduler stopped");
                    return;
                },
                _ = ticker.tick() => {
                    let evicted = registry.sweep_idle();
                    if evicted > 0 {
                        info!(evicted, "cleanup: evicted idle sessions");
                    } else {
                        debug!("cleanup: nothing to evict");
                    }
                },
            }
        }
    })
}
