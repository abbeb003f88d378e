//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES (e.g. `store.database_url_env:
//! "MPX_DATABASE_URL"`). Binaries call [`resolve_secrets`] once at startup
//! and pass the result into constructors. `Debug` output is redacted and
//! errors name the variable, never its value.

use anyhow::{bail, Result};

use crate::engine::{EngineConfig, StoreBackend};

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres connection URL. `None` for the memory backend or when the
    /// named variable is unset or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve secrets for the configured store backend.
///
/// The postgres backend fails closed when its URL variable is missing; the
/// memory backend needs nothing.
pub fn resolve_secrets(cfg: &EngineConfig) -> Result<ResolvedSecrets> {
    let var = cfg.store.database_url_env.trim();
    match cfg.store.backend {
        StoreBackend::Postgres => match resolve_env(var) {
            Some(url) => Ok(ResolvedSecrets {
                database_url: Some(url),
            }),
            None => bail!(
                "SECRETS_MISSING backend=postgres: required env var '{}' \
                 (database url) is not set or empty",
                var
            ),
        },
        StoreBackend::Memory => Ok(ResolvedSecrets { database_url: None }),
    }
}
