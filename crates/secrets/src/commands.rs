//! Commands - store, lookup, delete and list
//!
//! Each handler composes the lock, the store and the crypto oracle. Output
//! is left to the caller so the handlers stay free of process I/O.

use std::env::VarError;
use std::fmt;
use std::str::FromStr;

use secrets_core::StorePaths;

use crate::crypto::CryptoOracle;
use crate::error::{Result, VaultError};
use crate::lock::FileLock;
use crate::store::SecretsStore;

/// Environment variable naming the secret to operate on
pub const SECRET_ID_ENV: &str = "SECRET_ID";

/// The four vault operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Store,
    Lookup,
    Delete,
    List,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Lookup => "lookup",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }

    /// Whether the command operates on a single secret named by `SECRET_ID`
    pub fn needs_secret_id(&self) -> bool {
        !matches!(self, Self::List)
    }
}

impl FromStr for Command {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "store" => Ok(Self::Store),
            "lookup" => Ok(Self::Lookup),
            "delete" => Ok(Self::Delete),
            "list" => Ok(Self::List),
            other => Err(VaultError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-empty secret name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId(String);

impl SecretId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(VaultError::MissingSecretId);
        }
        Ok(Self(id))
    }

    /// Read the id from `SECRET_ID`; unset and empty are both missing
    pub fn from_env() -> Result<Self> {
        Self::from_var(std::env::var(SECRET_ID_ENV))
    }

    fn from_var(var: std::result::Result<String, VarError>) -> Result<Self> {
        match var {
            Ok(id) => Self::new(id),
            Err(VarError::NotPresent) => Err(VaultError::MissingSecretId),
            Err(VarError::NotUnicode(raw)) => {
                Err(VaultError::InvalidSecretId(raw.to_string_lossy().into_owned()))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a delete; a missing id is reported, not failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// A secrets store together with its lock and oracle
pub struct SecretsVault<O> {
    store: SecretsStore,
    lock: FileLock,
    oracle: O,
}

impl<O: CryptoOracle> SecretsVault<O> {
    pub fn new(paths: StorePaths, lock_timeout: std::time::Duration, oracle: O) -> Self {
        let lock = FileLock::new(&paths.lock_file, lock_timeout);
        Self {
            store: SecretsStore::new(paths),
            lock,
            oracle,
        }
    }

    pub fn paths(&self) -> &StorePaths {
        self.store.paths()
    }

    /// Create the store directory and empty store if absent
    pub fn bootstrap(&self) -> Result<()> {
        self.store.bootstrap(&self.lock)
    }

    /// Encrypt and store a secret, silently replacing any previous value
    pub fn store(&self, id: &SecretId, plaintext: &[u8]) -> Result<()> {
        let ciphertext = self.oracle.encrypt(id.as_str(), plaintext)?;
        // Store values are single-line; the oracle may emit armored multi-line text
        let ciphertext = ciphertext.replace('\n', "");

        let _guard = self.lock.acquire()?;
        let mut secrets = self.store.load()?;
        let replaced = secrets.insert(id.as_str(), ciphertext).is_some();
        self.store.save(&secrets)?;

        tracing::info!(secret_id = %id, replaced, "stored secret");
        Ok(())
    }

    /// Decrypt a stored secret
    pub fn lookup(&self, id: &SecretId) -> Result<Vec<u8>> {
        let secrets = {
            let _guard = self.lock.acquire()?;
            self.store.load()?
        };

        let ciphertext = secrets
            .get(id.as_str())
            .ok_or_else(|| VaultError::SecretNotFound(id.to_string()))?;

        self.oracle.decrypt(id.as_str(), ciphertext.as_bytes())
    }

    /// Remove a secret if present
    pub fn delete(&self, id: &SecretId) -> Result<DeleteOutcome> {
        let _guard = self.lock.acquire()?;
        let mut secrets = self.store.load()?;

        if secrets.remove(id.as_str()).is_none() {
            tracing::debug!(secret_id = %id, "delete of unknown secret");
            return Ok(DeleteOutcome::NotFound);
        }

        self.store.save(&secrets)?;
        tracing::info!(secret_id = %id, "deleted secret");
        Ok(DeleteOutcome::Deleted)
    }

    /// Decrypt every stored secret, in store order.
    ///
    /// This returns plaintext for the whole store.
    pub fn list(&self) -> Result<Vec<Vec<u8>>> {
        let secrets = {
            let _guard = self.lock.acquire()?;
            self.store.load()?
        };

        secrets
            .iter()
            .map(|(id, ciphertext)| self.oracle.decrypt(id, ciphertext.as_bytes()))
            .collect()
    }
}
