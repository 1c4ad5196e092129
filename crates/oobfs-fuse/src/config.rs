//! Daemon configuration.

use oobfs_core::ContextId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Host configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Comma-separated mount options (see the mount module).
    pub mount_options: String,
    /// Context ids classified as out-of-band from the start.
    pub out_of_band_contexts: Vec<ContextId>,
    /// Write the mutation audit trail to stderr.
    pub audit_stderr: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            mount_options: String::new(),
            out_of_band_contexts: Vec::new(),
            audit_stderr: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl HostConfig {
    /// Loads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
