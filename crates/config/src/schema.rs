//! Config schema types (gateway, sessions, recovery, loopback driver).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WagateConfig {
    pub gateway: GatewaySection,
    pub sessions: SessionsSection,
    pub recovery: RecoverySection,
    pub loopback: LoopbackSection,
    /// Credential storage directory. Defaults under the data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_dir: Option<PathBuf>,
}

impl WagateConfig {
    /// Resolved credential storage directory.
    pub fn credentials_dir(&self) -> PathBuf {
        self.auth_dir
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("auth"))
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8081,
        }
    }
}

/// Registry bounds and cleanup cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Hard cap on concurrently managed sessions.
    pub max_sessions: usize,
    /// Idle time after which a session is evicted.
    pub idle_ttl_minutes: u64,
    /// Cadence of the cleanup sweep.
    pub cleanup_interval_minutes: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            idle_ttl_minutes: 24 * 60,
            cleanup_interval_minutes: 30,
        }
    }
}

/// Startup recovery of persisted sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    pub enabled: bool,
    /// Grace period before the startup run begins.
    pub startup_delay_seconds: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay_seconds: 5,
        }
    }
}

/// Settings for the in-process loopback driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackSection {
    /// Delay between issuing a pairing code and the simulated scan.
    pub pair_delay_seconds: u64,
}

impl Default for LoopbackSection {
    fn default() -> Self {
        Self {
            pair_delay_seconds: 2,
        }
    }
}
