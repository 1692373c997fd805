//! Configuration management for container-secrets

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::{StorePaths, DEFAULT_STORE_ROOT};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "CONTAINER_SECRETS_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "/etc/containers/secrets.json";

/// container-secrets configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory holding the store and its lock file
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,

    /// How long to wait for the store lock (seconds)
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: f64,

    /// Program used to encrypt and decrypt secret values
    #[serde(default = "default_oracle_program")]
    pub oracle_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: default_store_root(),
            lock_timeout_secs: default_lock_timeout_secs(),
            oracle_program: default_oracle_program(),
        }
    }
}

fn default_store_root() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_ROOT)
}

fn default_lock_timeout_secs() -> f64 {
    30.0
}

fn default_oracle_program() -> String {
    "systemd-creds".to_string()
}

impl Config {
    /// Config file location: `$CONTAINER_SECRETS_CONFIG` or the system default
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load config from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Store paths, with an optional root from the command line taking precedence
    pub fn store_paths(&self, root_override: Option<&Path>) -> StorePaths {
        StorePaths::new(root_override.unwrap_or(&self.store_root))
    }

    /// Lock wait as a `Duration`: negative or NaN is zero, out of range saturates
    pub fn lock_timeout(&self) -> Duration {
        let secs = self.lock_timeout_secs;
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}
