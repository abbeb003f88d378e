//! Typed view over the merged configuration JSON.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overrides `daemon.bind_addr` when set and non-blank.
pub const ENV_DAEMON_ADDR: &str = "MPX_DAEMON_ADDR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Env var NAME holding the Postgres URL.
    pub database_url_env: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url_env: "MPX_DATABASE_URL".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind_addr: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8899".to_string(),
        }
    }
}

impl DaemonConfig {
    /// `MPX_DAEMON_ADDR` if set, otherwise the configured address.
    pub fn effective_bind_addr(&self) -> String {
        match std::env::var(ENV_DAEMON_ADDR) {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => self.bind_addr.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub transactions: TransactionConfig,
    pub notifications: NotificationConfig,
    pub daemon: DaemonConfig,
}

impl EngineConfig {
    /// Build from merged config JSON. Absent sections take their defaults;
    /// keys outside the typed view are left to the unused-key report.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: engine config does not match expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transactions.max_attempts == 0 {
            bail!("CONFIG_INVALID: transactions.max_attempts must be >= 1");
        }
        if self.transactions.base_backoff_ms > self.transactions.max_backoff_ms {
            bail!(
                "CONFIG_INVALID: transactions.base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.transactions.base_backoff_ms,
                self.transactions.max_backoff_ms
            );
        }
        if self.notifications.queue_capacity == 0 {
            bail!("CONFIG_INVALID: notifications.queue_capacity must be >= 1");
        }
        if self.store.max_connections == 0 {
            bail!("CONFIG_INVALID: store.max_connections must be >= 1");
        }
        if self.store.database_url_env.trim().is_empty() {
            bail!("CONFIG_INVALID: store.database_url_env must name an env var");
        }
        Ok(())
    }
}
