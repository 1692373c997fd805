//! Vault errors

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Vault-specific errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("SECRET_ID environment variable is not set")]
    MissingSecretId,

    #[error("SECRET_ID environment variable is not valid UTF-8: {0}")]
    InvalidSecretId(String),

    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Timed out after {timeout:?} waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[error("Corrupt secrets store {}: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Failed to transform secret '{name}': {reason}")]
    CryptoFailure {
        name: String,
        reason: String,
        /// Captured output of the oracle process
        diagnostics: String,
    },

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
