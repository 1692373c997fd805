//! Standard paths used by the secrets store

use std::path::{Path, PathBuf};

/// Root directory used when neither the command line nor the config names one
pub const DEFAULT_STORE_ROOT: &str = "/var/lib/containers/storage/secrets/encrypted";

const DATA_FILE: &str = "secretsdata.json";
const LOCK_FILE: &str = "secretsdata.lock";

/// Files that make up one secrets store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Store root (created with mode 0700)
    pub root: PathBuf,
    /// JSON object of secret id -> ciphertext
    pub data_file: PathBuf,
    /// Sibling lock file, only ever flock()ed
    pub lock_file: PathBuf,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_ROOT)
    }
}

impl StorePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let data_file = root.join(DATA_FILE);
        let lock_file = root.join(LOCK_FILE);

        Self {
            root,
            data_file,
            lock_file,
        }
    }
}
