//! On-disk credential store: one directory per session key.
//!
//! Layout mirrors what multi-file auth engines leave behind:
//!
//! ```text
//! <root>/<session-key>/creds.json
//! ```
//!
//! A well-formed `creds.json` is the signal the recovery coordinator
//! uses to revive a session without re-pairing.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::adapter::AdapterError;

/// File holding the credential record inside a key's directory.
const CREDS_FILE: &str = "creds.json";

/// Maximum accepted session key length.
const MAX_KEY_LEN: usize = 64;

/// Returns true when `key` is safe to use as a directory name.
///
/// Keys come straight from URL path segments, so anything outside
/// `[A-Za-z0-9._-]` is rejected before it can touch the filesystem.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key != "."
        && key != ".."
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

// ── Record ───────────────────────────────────────────────────────────────────

/// Persisted pairing credentials for one session key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Protocol identity assigned at pairing, e.g. `1555...@s.whatsapp.net`.
    pub identity: String,
    /// Opaque key material owned by the wire engine.
    #[serde(default)]
    pub material: serde_json::Value,
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding credential material for `key`.
    pub fn dir_for(&self, key: &str) -> Result<PathBuf, AdapterError> {
        if !is_valid_key(key) {
            return Err(AdapterError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Load the credential record for `key`, if present and well-formed.
    /// A malformed record is logged and treated as absent.
    pub fn load(&self, key: &str) -> Result<Option<CredentialRecord>, AdapterError> {
        let path = self.dir_for(key)?.join(CREDS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key, error = %e, "malformed credential record, ignoring");
                Ok(None)
            },
        }
    }

    /// Persist the credential record for `key`, creating its directory.
    pub fn save(&self, key: &str, record: &CredentialRecord) -> Result<(), AdapterError> {
        let dir = self.dir_for(key)?;
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| AdapterError::OpenFailed(format!("serialize credentials: {e}")))?;
        fs::write(dir.join(CREDS_FILE), data)?;
        debug!(key, "credentials saved");
        Ok(())
    }

    /// List session keys with verifiably present credential material,
    /// sorted. Unreadable or malformed entries are skipped.
    pub fn scan(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut keys: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|key| is_valid_key(key))
            .filter(|key| matches!(self.load(key), Ok(Some(_))))
            .collect();
        keys.sort();
        keys
    }
}
