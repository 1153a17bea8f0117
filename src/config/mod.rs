//! Treemesh Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./treemesh.yaml` (current directory - highest priority)
//! 2. `~/.treemesh.yaml` (home directory)
//! 3. `~/.config/treemesh/treemesh.yaml` (user config directory)
//! 4. `/etc/treemesh/treemesh.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! node:
//!   listen_addr: "127.0.0.1:5000"
//!   root: false
//!   root_addr: "127.0.0.1:6666"
//!   tick_interval_ms: 100
//!   reunion:
//!     hello_interval_ms: 5000
//!     failure_timeout_ms: 12000
//!     root_timeout_ms: 20000
//!     sweep_interval_ms: 1000
//! transport:
//!   connect_timeout_ms: 2000
//!   ack_timeout_ms: 2000
//!   channel_capacity: 1024
//! ```

mod node;
mod transport;

use crate::address::{Address, AddressError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use node::{NodeConfig, ReunionConfig};
pub use transport::TransportConfig;

/// Default config filename.
const CONFIG_FILENAME: &str = "treemesh.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid {field}: {source}")]
    InvalidAddress {
        field: &'static str,
        source: AddressError,
    },

    #[error("node.root_addr is required when node.root is false")]
    MissingRootAddr,

    #[error("invalid reunion timing: {0}")]
    InvalidTiming(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,

    /// Transport configuration (`transport.*`).
    #[serde(default)]
    pub transport: TransportConfig,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/treemesh").join(CONFIG_FILENAME));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("treemesh").join(CONFIG_FILENAME));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".treemesh.yaml"));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        self.node.merge(other.node);
        self.transport.merge(other.transport);
    }

    /// This peer's overlay address.
    pub fn listen_address(&self) -> Result<Address, ConfigError> {
        self.node
            .listen_addr()
            .parse()
            .map_err(|source| ConfigError::InvalidAddress {
                field: "node.listen_addr",
                source,
            })
    }

    /// The root's overlay address. `None` when this node is the root.
    pub fn root_address(&self) -> Result<Option<Address>, ConfigError> {
        if self.node.root {
            return Ok(None);
        }
        let text = self.node.root_addr.as_deref().ok_or(ConfigError::MissingRootAddr)?;
        text.parse()
            .map(Some)
            .map_err(|source| ConfigError::InvalidAddress {
                field: "node.root_addr",
                source,
            })
    }

    /// Check addresses, role requirements and timing ratios.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_address()?;
        self.root_address()?;
        if self.node.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "tick_interval_ms must be non-zero".into(),
            ));
        }
        self.node
            .reunion
            .check_ratios()
            .map_err(ConfigError::InvalidTiming)
    }

    /// Check if this node is configured as the overlay root.
    pub fn is_root(&self) -> bool {
        self.node.root
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
