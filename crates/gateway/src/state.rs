use std::sync::Arc;

use {tokio::time::Instant, tokio_util::sync::CancellationToken};

use {
    wagate_protocol::CredentialStore,
    wagate_sessions::{SessionRegistry, recovery::RecoveryOptions},
};

use crate::auth::ResolvedAuth;

/// Shared gateway runtime state, wrapped in Arc for use across handlers
/// and background tasks.
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub store: CredentialStore,
    pub auth: ResolvedAuth,
    pub recovery: RecoveryOptions,
    pub started_at: Instant,
    /// Server version string.
    pub version: String,
    /// Cancels the cleanup scheduler on shutdown.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    /// Seconds since the gateway started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
