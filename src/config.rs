//! Transaction buffer configuration.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

/// Default undo memory budget: 16 MiB.
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 16 * 1024 * 1024;

/// Failure to load a [`BufferConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io(std::io::Error),
    /// The document is not valid configuration JSON.
    Serde(serde_json::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Settings for [`crate::core::buffer::TransactionBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Oldest transactions are evicted at `begin` while history exceeds this.
    pub max_memory_bytes: usize,
    /// Reset reason recorded when the buffer is created.
    pub startup_reason: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            startup_reason: "Startup".to_string(),
        }
    }
}

impl BufferConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
