//! Store - The on-disk mapping of secret id to ciphertext
//!
//! The whole store is one JSON object in `secretsdata.json`. Nothing here
//! takes the lock: callers hold the [`FileLock`] around every load/save.

use serde_json::{Map, Value};
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use secrets_core::StorePaths;

use crate::error::{Result, VaultError};
use crate::lock::FileLock;

/// Ordered mapping of secret id -> ciphertext, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretMap {
    // Values are always JSON strings
    entries: Map<String, Value>,
}

impl SecretMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).and_then(Value::as_str)
    }

    /// Set a ciphertext. An existing id keeps its position.
    pub fn insert(&mut self, id: impl Into<String>, ciphertext: impl Into<String>) -> Option<String> {
        self.entries
            .insert(id.into(), Value::String(ciphertext.into()))
            .and_then(into_string)
    }

    /// Remove an id, preserving the order of the remaining entries
    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.entries.shift_remove(id).and_then(into_string)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(id, value)| value.as_str().map(|ct| (id.as_str(), ct)))
    }

    /// Parse store contents; the error is a human-readable reason
    fn from_json(text: &str) -> std::result::Result<Self, String> {
        let entries = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => return Err("expected a JSON object".to_string()),
            Err(e) => return Err(e.to_string()),
        };

        if let Some((id, _)) = entries.iter().find(|(_, value)| !value.is_string()) {
            return Err(format!("value for '{}' is not a string", id));
        }

        Ok(Self { entries })
    }

    fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries)
    }
}

fn into_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// JSON-file backed secrets store
pub struct SecretsStore {
    paths: StorePaths,
}

impl SecretsStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Create the store directory and an empty store if they are missing.
    ///
    /// The directory is created (mode 0700) before the lock can exist; the
    /// empty `{}` file (mode 0600) is written under the lock. Safe to run on
    /// every invocation: an existing store is never touched.
    pub fn bootstrap(&self, lock: &FileLock) -> Result<()> {
        let root = &self.paths.root;
        if !root.exists() {
            DirBuilder::new().recursive(true).mode(0o700).create(root)?;
            // mode() is filtered through the umask
            fs::set_permissions(root, Permissions::from_mode(0o700))?;
            tracing::info!(root = %root.display(), "created secrets directory");
        }

        let _guard = lock.acquire()?;
        if !self.paths.data_file.exists() {
            write_empty_store(&self.paths.data_file)?;
            tracing::info!(path = %self.paths.data_file.display(), "initialized empty secrets store");
        }

        Ok(())
    }

    /// Read and parse the whole store
    pub fn load(&self) -> Result<SecretMap> {
        let path = &self.paths.data_file;
        let text = fs::read_to_string(path)?;

        let secrets = SecretMap::from_json(&text).map_err(|reason| VaultError::CorruptStore {
            path: path.clone(),
            reason,
        })?;

        tracing::debug!(path = %path.display(), entries = secrets.len(), "loaded secrets store");
        Ok(secrets)
    }

    /// Replace the store contents with `secrets`
    pub fn save(&self, secrets: &SecretMap) -> Result<()> {
        let path = &self.paths.data_file;
        let json = secrets.to_json()?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".secretsdata.")
            .tempfile_in(&self.paths.root)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        fs::set_permissions(tmp.path(), Permissions::from_mode(0o600))?;
        tmp.persist(path).map_err(|e| e.error)?;

        tracing::debug!(path = %path.display(), entries = secrets.len(), "saved secrets store");
        Ok(())
    }
}

fn write_empty_store(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(b"{}")?;
    file.sync_all()?;
    fs::set_permissions(path, Permissions::from_mode(0o600))?;
    Ok(())
}
