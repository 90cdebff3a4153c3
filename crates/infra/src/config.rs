//! Configuration loading and representation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use stockledger_inventory::Item;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_API_TOKEN: &str = "dev-token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("failed to read seed items from {path}: {reason}")]
    SeedItems { path: PathBuf, reason: String },
}

/// Which backend holds the balance table and the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub lock_timeout: Duration,
    pub persistence: Persistence,
    pub bind_addr: SocketAddr,
    pub api_token: String,
    pub seed_items: Option<PathBuf>,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lock_timeout_ms = match lookup("STOCKLEDGER_LOCK_TIMEOUT_MS") {
            None => DEFAULT_LOCK_TIMEOUT_MS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "STOCKLEDGER_LOCK_TIMEOUT_MS",
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(ms) => ms,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "STOCKLEDGER_LOCK_TIMEOUT_MS",
                        reason: e.to_string(),
                    })
                }
            },
        };

        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);
        let persistence = if use_persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            Persistence::Postgres { database_url }
        } else {
            Persistence::InMemory
        };

        let bind_raw = lookup("STOCKLEDGER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.trim().parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            name: "STOCKLEDGER_BIND_ADDR",
            reason: e.to_string(),
        })?;

        let api_token = lookup("STOCKLEDGER_API_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| {
                warn!("STOCKLEDGER_API_TOKEN not set; using insecure dev default");
                DEV_API_TOKEN.to_string()
            });

        let seed_items = lookup("STOCKLEDGER_SEED_ITEMS")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            persistence,
            bind_addr,
            api_token,
            seed_items,
        })
    }

    /// Items listed in the seed file, or none when no file is configured.
    pub fn load_seed_items(&self) -> Result<Vec<Item>, ConfigError> {
        let Some(path) = &self.seed_items else {
            return Ok(Vec::new());
        };
        let seed_error = |reason: String| ConfigError::SeedItems {
            path: path.clone(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))
    }
}
