//! Configuration file loading.

use recon_consumer::ConsumerConfig;
use recon_engine::ReconcileConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or completing the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path:?}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`Settings`].
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// A required setting has no value.
    #[error("missing setting: {0} (set it in the config file or pass --{0})")]
    Missing(&'static str),
}

/// Everything the CLI can be configured with.
///
/// Loaded from a JSON file; command-line flags override file values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Catalog API base URL.
    pub base_url: Option<String>,
    /// Bearer token for the catalog API.
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Reconciliation policy.
    pub reconcile: ReconcileConfig,
    /// Message consumption settings.
    pub consumer: ConsumerConfig,
}

impl Settings {
    /// Loads settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Replaces file values with flags that were given.
    pub fn apply_overrides(&mut self, base_url: Option<String>, token: Option<String>) {
        if base_url.is_some() {
            self.base_url = base_url;
        }
        if token.is_some() {
            self.token = token;
        }
    }

    /// Turns off batching and cascading, keeping request options.
    pub fn force_sequential(&mut self) {
        self.reconcile = self
            .reconcile
            .clone()
            .with_auto_create_missing_related(false)
            .with_cascade_delete_dependents(false);
    }

    /// The base URL, which remote commands require.
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("base-url"))
    }
}
