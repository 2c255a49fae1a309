//! CLI configuration file.

use jobsync_realtime::RealtimeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Settings for the `jobsync` binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Base URL of the portal REST API.
    pub api_url: String,
    /// WebSocket endpoint of the STOMP broker.
    pub ws_url: String,
    /// Credentials file; the platform config directory when unset.
    pub credentials_path: Option<PathBuf>,
    /// Log level.
    pub log_level: String,
    /// Log format: `pretty` or `json`.
    pub log_format: String,
    /// Real-time layer tunables.
    pub realtime: RealtimeConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            ws_url: "ws://127.0.0.1:8080/ws".to_string(),
            credentials_path: None,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl CliConfig {
    /// `<config dir>/jobsync/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("jobsync").join("config.yaml"))
    }

    /// Load `path`, or the default file if it exists, or the defaults.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_yaml(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_yaml(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load a YAML file.
    pub fn load_yaml(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
