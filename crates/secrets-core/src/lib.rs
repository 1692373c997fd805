//! secrets-core - Shared functionality for container-secrets
//!
//! Configuration and the on-disk layout of the encrypted store.

pub mod config;
pub mod paths;

pub use config::Config;
pub use paths::StorePaths;
