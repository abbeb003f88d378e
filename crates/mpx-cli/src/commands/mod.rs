//! Command implementations. Each returns the lines to print so the
//! output can be checked without a terminal.

pub mod config;
pub mod inspect;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use mpx_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, ConfigSurface,
    EngineConfig, UnusedKeyPolicy,
};
use mpx_notify::NullNotifier;
use mpx_store::PgStore;
use mpx_workflow::{RetryPolicy, Workflow};

/// Typed config from the `--config` layers; defaults when none are given.
pub fn engine_config(paths: &[String]) -> Result<EngineConfig> {
    let loaded = if paths.is_empty() {
        load_layered_yaml_from_strings(&[])?
    } else {
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        load_layered_yaml(&refs)?
    };
    let report = report_unused_keys(ConfigSurface::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config has keys the cli does not read");
    }
    info!(config_hash = %loaded.config_hash, "config loaded");
    loaded.engine()
}

/// The CLI always inspects Postgres, whatever backend the daemon runs on.
pub async fn connect(paths: &[String]) -> Result<PgPool> {
    let cfg = engine_config(paths)?;
    let var = cfg.store.database_url_env.trim();
    let url = std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("missing env var {var}"))?;
    mpx_store::connect(&url, cfg.store.max_connections).await
}

/// Read-only workflow over Postgres; notifications are discarded.
pub async fn open_workflow(paths: &[String]) -> Result<Workflow> {
    let pool = connect(paths).await?;
    Ok(Workflow::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(NullNotifier),
        RetryPolicy::default(),
    ))
}
