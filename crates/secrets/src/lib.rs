//! secrets - Encrypted secrets store for container runtimes
//!
//! "The store never sees plaintext."
//!
//! Secrets are kept as name-bound ciphertext in one JSON file. Every access
//! to that file happens under an advisory file lock, so any number of
//! concurrent `container-secrets` processes can share a store safely.
//! Encryption itself is delegated to a crypto oracle (`systemd-creds` by
//! default).

pub mod commands;
pub mod crypto;
pub mod error;
pub mod lock;
pub mod store;

pub use commands::{Command, DeleteOutcome, SecretId, SecretsVault};
pub use crypto::{CryptoOracle, SystemdCreds};
pub use error::{Result, VaultError};
pub use lock::{FileLock, LockGuard};
pub use store::{SecretMap, SecretsStore};
