//! Storage configuration records.
//!
//! [`SystemConfig`] lists every named storage location; each
//! [`StorageConfig`] carries a storage-type tag and a backend-specific option
//! map. The core only reads these records; parsing the file they come from is
//! a convenience for the CLI and tests.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TroveError;
use crate::Result;

/// Option key holding the root directory of filesystem-backed storage.
pub const ROOT_PATH_OPTION: &str = "root_path";

/// Configuration for one named storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Tag selecting the registered backend, e.g. `"LOCAL_STORAGE"`.
    pub storage_type: String,

    /// Backend-specific options, passed through unvalidated.
    #[serde(default)]
    pub storage_config: HashMap<String, String>,
}

impl StorageConfig {
    pub fn new(storage_type: impl Into<String>) -> Self {
        Self {
            storage_type: storage_type.into(),
            storage_config: HashMap::new(),
        }
    }

    /// Add a backend option, builder style.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.storage_config.insert(key.into(), value.into());
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.storage_config.get(key).map(String::as_str)
    }

    /// Look up an option that must be present.
    pub fn required_option(&self, key: &str) -> Result<&str> {
        self.option(key).ok_or_else(|| {
            TroveError::config(format!(
                "Missing required option [{key}] for storage type [{}]",
                self.storage_type
            ))
        })
    }
}

/// The storage section of the system configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Named storage locations, keyed by storage key.
    #[serde(default)]
    pub storage: HashMap<String, StorageConfig>,
}

impl SystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named storage location, builder style.
    pub fn with_storage(mut self, key: impl Into<String>, config: StorageConfig) -> Self {
        self.storage.insert(key.into(), config);
        self
    }

    /// Parse a system configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TroveError::config(format!("Invalid system configuration: {e}")))
    }

    /// Load a system configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TroveError::config(format!(
                "Cannot read system configuration {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&text)
    }
}
