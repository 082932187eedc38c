// ⚙️ Configuration - Paths and addresses
//
// Defaults < environment variables < command-line flags

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_DB: &str = "KEEPER_DB";
pub const ENV_CATALOG: &str = "KEEPER_CATALOG";
pub const ENV_BIND: &str = "KEEPER_BIND";
pub const ENV_ACTOR: &str = "KEEPER_ACTOR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database holding characters, campaigns and the audit trail
    pub db_path: PathBuf,
    /// Shop catalog fixture (CSV)
    pub catalog_path: PathBuf,
    /// Server listen address
    pub bind_addr: String,
    /// Recorded as the actor on audit events
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("campaign.db"),
            catalog_path: PathBuf::from("data/catalog.csv"),
            bind_addr: "0.0.0.0:3000".to_string(),
            actor: "dm".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, test map)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = lookup(ENV_DB).filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_CATALOG).filter(|v| !v.is_empty()) {
            config.catalog_path = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_BIND).filter(|v| !v.is_empty()) {
            config.bind_addr = v;
        }
        if let Some(v) = lookup(ENV_ACTOR).filter(|v| !v.is_empty()) {
            config.actor = v;
        }

        config
    }
}

/// Install the tracing subscriber (RUST_LOG, default "info")
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
