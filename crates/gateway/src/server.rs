use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Json, Router,
        extract::{Path, State, rejection::JsonRejection},
        middleware,
        response::IntoResponse,
        routing::{get, post},
    },
    serde::{Deserialize, Serialize},
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use {
    wagate_config::WagateConfig,
    wagate_protocol::{CredentialStore, Jid, ProtocolAdapter, creds},
    wagate_sessions::{RegistryConfig, SessionRegistry, cleanup, recovery},
};

use crate::{auth, auth::ResolvedAuth, error::ApiError, state::GatewayState};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let app_state = AppState { gateway: state };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let guarded = Router::new()
        .route("/sessions/{key}/connect", post(connect_handler))
        .route("/sessions/{key}", get(status_handler))
        .route("/sessions/{key}/send-text", post(send_text_handler))
        .route("/admin/stats", get(stats_handler))
        .route("/admin/cleanup", post(cleanup_handler))
        .route("/admin/recovery", post(recovery_handler))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Wire up registry, schedulers, and recovery, then serve HTTP until
/// the listener dies.
pub async fn start(
    config: &WagateConfig,
    resolved_auth: ResolvedAuth,
    store: CredentialStore,
    adapter: Arc<dyn ProtocolAdapter>,
) -> anyhow::Result<()> {
    let registry = SessionRegistry::new(adapter, RegistryConfig {
        max_sessions: config.sessions.max_sessions,
        idle_ttl: Duration::from_secs(config.sessions.idle_ttl_minutes * 60),
    });

    let shutdown = CancellationToken::new();
    let _sweeper = cleanup::spawn(
        Arc::clone(&registry),
        Duration::from_secs(config.sessions.cleanup_interval_minutes * 60),
        shutdown.clone(),
    );

    let recovery_opts = recovery::RecoveryOptions {
        startup_delay: Duration::from_secs(config.recovery.startup_delay_seconds),
        ..recovery::RecoveryOptions::default()
    };
    if config.recovery.enabled {
        recovery::spawn_startup(
            Arc::clone(&registry),
            store.clone(),
            recovery_opts.clone(),
        );
    }

    let state = Arc::new(GatewayState {
        registry,
        store,
        auth: resolved_auth,
        recovery: recovery_opts,
        started_at: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        shutdown: shutdown.clone(),
    });

    let app = build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("wagate v{}", state.version),
        format!("listening on {addr}"),
        format!(
            "sessions: max {}, idle ttl {}m, cleanup every {}m",
            config.sessions.max_sessions,
            config.sessions.idle_ttl_minutes,
            config.sessions.cleanup_interval_minutes
        ),
        format!(
            "recovery: {}",
            if config.recovery.enabled { "enabled" } else { "disabled" }
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app).await?;
    shutdown.cancel();
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn validated_key(key: &str) -> Result<&str, ApiError> {
    if creds::is_valid_key(key) {
        Ok(key)
    } else {
        Err(ApiError::Validation("invalid session key".into()))
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn connect_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let key = validated_key(&key)?;
    let view = state.gateway.registry.ensure(key).await?;
    // The first pairing code may land milliseconds after this returns;
    // clients poll the status route for it.
    Ok(Json(serde_json::json!({ "status": view.status, "qr": view.qr })))
}

async fn status_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let key = validated_key(&key)?;
    let view = state.gateway.registry.ensure(key).await?;
    Ok(Json(serde_json::json!({
        "status": view.status,
        "phone": view.phone,
        "qr": view.qr,
    })))
}

#[derive(Debug, Deserialize)]
struct SendTextBody {
    #[serde(default)]
    to: String,
    #[serde(default)]
    text: String,
}

async fn send_text_handler(
    Path(key): Path<String>,
    State(state): State<AppState>,
    body: Result<Json<SendTextBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let key = validated_key(&key)?;
    let Ok(Json(body)) = body else {
        return Err(ApiError::Validation("to and text are required".into()));
    };
    if body.to.is_empty() || body.text.is_empty() {
        return Err(ApiError::Validation("to and text are required".into()));
    }
    if body.text.trim().is_empty() {
        return Err(ApiError::Validation(
            "text must be a non-empty string".into(),
        ));
    }
    let to = Jid::normalize(&body.to).map_err(|_| {
        ApiError::Validation("to must be a valid phone number or JID".into())
    })?;

    state.gateway.registry.send_text(key, &to, &body.text).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    active_sessions: usize,
    max_sessions: usize,
    memory_usage: u64,
    uptime: u64,
}

async fn stats_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let gateway = &state.gateway;
    Ok(Json(StatsResponse {
        active_sessions: gateway.registry.len(),
        max_sessions: gateway.registry.max_sessions(),
        memory_usage: process_memory_bytes(),
        uptime: gateway.uptime_secs(),
    }))
}

/// Resident set size of this process, in bytes. Zero when the platform
/// refuses to say.
fn process_memory_bytes() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

async fn cleanup_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let evicted = state.gateway.registry.sweep_idle();
    Ok(Json(serde_json::json!({
        "message": format!("cleanup complete, evicted {evicted} idle sessions"),
    })))
}

async fn recovery_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let gateway = &state.gateway;
    let report = recovery::run(&gateway.registry, &gateway.store, &gateway.recovery).await;
    Ok(Json(serde_json::json!({
        "message": format!(
            "recovery complete: {} attempted, {} recovered, {} failed",
            report.attempted,
            report.recovered,
            report.failed.len()
        ),
    })))
}
