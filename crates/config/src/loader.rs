use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::schema::WagateConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["wagate.toml", "wagate.yaml", "wagate.yml", "wagate.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks
/// in this directory (project-local and user-global paths are skipped).
/// Can be called multiple times (e.g. in tests) — each call replaces
/// the previous override.
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE.lock().unwrap() = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE.lock().unwrap() = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE.lock().unwrap().clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WagateConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wagate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wagate/wagate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WagateConfig::default()` if no config file is found or the
/// found one fails to parse.
pub fn discover_and_load() -> WagateConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(config) => return config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    WagateConfig::default()
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched —
/// project-local and user-global paths are skipped for isolation.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
        // Override is set — don't fall through to other locations.
        return None;
    }

    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/wagate/
    if let Some(dir) = home_dir().map(|h| h.join(".config").join("wagate")) {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the data directory: `~/.wagate/` on all platforms.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".wagate"))
        .unwrap_or_else(|| PathBuf::from(".wagate"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WagateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

// ── Environment overrides ────────────────────────────────────────────────────

/// Apply `WAGATE_*` environment overrides on top of the file config.
/// Unparseable values are logged and skipped.
pub fn apply_env_overrides(config: &mut WagateConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

fn apply_overrides_from(
    config: &mut WagateConfig,
    get: impl Fn(&str) -> Option<String>,
) {
    fn parsed<T: std::str::FromStr>(name: &str, raw: &str) -> Option<T> {
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(name, raw, "ignoring unparseable environment override");
                None
            },
        }
    }

    if let Some(v) = get("WAGATE_BIND") {
        config.gateway.bind = v;
    }
    if let Some(v) = get("WAGATE_PORT")
        && let Some(port) = parsed("WAGATE_PORT", &v)
    {
        config.gateway.port = port;
    }
    if let Some(v) = get("WAGATE_AUTH_DIR") {
        config.auth_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("WAGATE_MAX_SESSIONS")
        && let Some(max) = parsed("WAGATE_MAX_SESSIONS", &v)
    {
        config.sessions.max_sessions = max;
    }
    if let Some(v) = get("WAGATE_SESSION_TTL_MINUTES")
        && let Some(ttl) = parsed("WAGATE_SESSION_TTL_MINUTES", &v)
    {
        config.sessions.idle_ttl_minutes = ttl;
    }
    if let Some(v) = get("WAGATE_CLEANUP_INTERVAL_MINUTES")
        && let Some(interval) = parsed("WAGATE_CLEANUP_INTERVAL_MINUTES", &v)
    {
        config.sessions.cleanup_interval_minutes = interval;
    }
    if let Some(v) = get("WAGATE_RECOVERY_ENABLED") {
        config.recovery.enabled = matches!(v.as_str(), "1" | "true" | "yes");
    }
    if let Some(v) = get("WAGATE_RECOVERY_DELAY_SECONDS")
        && let Some(delay) = parsed("WAGATE_RECOVERY_DELAY_SECONDS", &v)
    {
        config.recovery.startup_delay_seconds = delay;
    }
}
