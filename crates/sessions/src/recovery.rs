//! Cold-start revival of previously-paired sessions.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tracing::{info, warn},
};

use wagate_protocol::CredentialStore;

use crate::registry::SessionRegistry;

/// Knobs for a recovery run.
#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// How many sessions to open concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches, bounding load on the wire engine.
    pub batch_pause: Duration,
    /// Grace period before the startup run begins.
    pub startup_delay: Duration,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause: Duration::from_millis(500),
            startup_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one recovery run.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Keys with verifiably present credential material.
    pub attempted: usize,
    pub recovered: usize,
    /// Per-key failures; an individual failure never aborts the run.
    pub failed: Vec<(String, String)>,
}

/// Scan the credential store and re-establish every revivable session.
///
/// Candidates run in fixed-size concurrent batches with a pause between
/// batches. Idempotent: keys already live resolve to their existing
/// entry, so re-triggering over the admin surface is safe.
pub async fn run(
    registry: &Arc<SessionRegistry>,
    store: &CredentialStore,
    opts: &RecoveryOptions,
) -> RecoveryReport {
    let candidates = store.scan();
    let mut report = RecoveryReport {
        attempted: candidates.len(),
        ..RecoveryReport::default()
    };
    if candidates.is_empty() {
        info!("recovery: no persisted sessions found");
        return report;
    }
    info!(candidates = candidates.len(), "recovery: reviving persisted sessions");

    let mut first = true;
    for batch in candidates.chunks(opts.batch_size.max(1)) {
        if !first {
            tokio::time::sleep(opts.batch_pause).await;
        }
        first = false;

        let outcomes = join_all(
            batch
                .iter()
                .map(|key| async move { (key.clone(), registry.ensure(key).await) }),
        )
        .await;

        for (key, outcome) in outcomes {
            match outcome {
                Ok(_) => report.recovered += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "recovery failed for session");
                    report.failed.push((key, e.to_string()));
                },
            }
        }
    }

    info!(
        recovered = report.recovered,
        failed = report.failed.len(),
        "recovery complete"
    );
    report
}

/// Spawn the delayed startup recovery run.
pub fn spawn_startup(
    registry: Arc<SessionRegistry>,
    store: CredentialStore,
    opts: RecoveryOptions,
) {
    tokio::spawn(async move {
        tokio::time::sleep(opts.startup_delay).await;
        run(&registry, &store, &opts).await;
    });
}

#[cfg(test)]
mod tests {
    use wagate_protocol::CredentialRecord;

    use super::*;
    use crate::{registry::RegistryConfig, testutil::FakeAdapter};

    fn seed(store: &CredentialStore, key: &str) {
        store
            .save(key, &CredentialRecord {
                identity: format!("{key}@s.whatsapp.net"),
                material: serde_json::Value::Null,
            })
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_only_keys_with_valid_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        seed(&store, "a");
        seed(&store, "b");
        seed(&store, "c");
        // Two candidates without usable credential material.
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::create_dir_all(dir.path().join("bad")).unwrap();
        std::fs::write(dir.path().join("bad/creds.json"), "not json").unwrap();

        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, RegistryConfig::default());

        let report = run(&registry, &store, &RecoveryOptions::default()).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.recovered, 3);
        assert!(report.failed.is_empty());
        assert_eq!(adapter.opens(), 3);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_individual_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        seed(&store, "good1");
        seed(&store, "flaky");
        seed(&store, "good2");

        let adapter = FakeAdapter::failing_for(&["flaky"]);
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, RegistryConfig::default());

        let report = run(&registry, &store, &RecoveryOptions::default()).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.recovered, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "flaky");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        seed(&store, "a");

        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, RegistryConfig::default());

        run(&registry, &store, &RecoveryOptions::default()).await;
        let report = run(&registry, &store, &RecoveryOptions::default()).await;
        assert_eq!(report.recovered, 1);
        // Second run hit the live entry, no second open.
        assert_eq!(adapter.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_in_bounded_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        for i in 0..5 {
            seed(&store, &format!("k{i}"));
        }

        let adapter = FakeAdapter::new();
        let registry = SessionRegistry::new(Arc::clone(&adapter) as _, RegistryConfig::default());

        let opts = RecoveryOptions {
            batch_size: 2,
            batch_pause: Duration::from_millis(100),
            ..RecoveryOptions::default()
        };
        let report = run(&registry, &store, &opts).await;
        assert_eq!(report.recovered, 5);
        assert_eq!(registry.len(), 5);
    }
}
