//! mpx-daemon entry point.
//!
//! Thin on purpose: load config, pick the store backend, build the shared
//! state, wire middleware and serve. Handlers live in `routes.rs`.
//!
//! Config layers come from `MPX_CONFIG` (comma-separated YAML paths,
//! later layers override earlier ones). Without it the daemon runs on the
//! built-in defaults: in-memory store on 127.0.0.1:8899.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mpx_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, secrets::resolve_secrets,
    ConfigSurface, EngineConfig, LoadedConfig, StoreBackend, UnusedKeyPolicy,
};
use mpx_daemon::{routes, state};
use mpx_store::{EntityStore, MemoryStore, PgStore};
use mpx_workflow::RetryPolicy;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const ENV_CONFIG_PATHS: &str = "MPX_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let cfg = loaded.engine()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let report = report_unused_keys(ConfigSurface::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the daemon does not read");
    }

    let store = open_store(&cfg).await?;
    let retry = RetryPolicy::new(
        cfg.transactions.max_attempts,
        cfg.transactions.base_backoff_ms,
        cfg.transactions.max_backoff_ms,
    );
    let shared = Arc::new(state::AppState::new(
        store,
        retry,
        cfg.notifications.queue_capacity,
    ));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: SocketAddr = cfg
        .daemon
        .effective_bind_addr()
        .parse()
        .context("daemon bind address is not a socket address")?;
    info!("mpx-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(v) if !v.trim().is_empty() => {
            let paths: Vec<&str> = v.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
            load_layered_yaml(&paths)
        }
        _ => load_layered_yaml_from_strings(&["{}"]),
    }
}

async fn open_store(cfg: &EngineConfig) -> anyhow::Result<Arc<dyn EntityStore>> {
    let secrets = resolve_secrets(cfg)?;
    match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("memory store: state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = secrets
                .database_url
                .context("postgres backend selected without a database url")?;
            let pool = mpx_store::connect(&url, cfg.store.max_connections).await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            info!("postgres store ready");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler failed; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
