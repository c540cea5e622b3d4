//! Cluster configuration shared by the directory, the nodes and the clients.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `BIGFS_`-prefixed environment variables (e.g. `BIGFS_DIRECTORY_PORT`).
//! Binaries apply their command-line overrides on top of the loaded value.

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DIRECTORY_HOST: &str = "127.0.0.1";
pub const DEFAULT_DIRECTORY_PORT: u16 = 5000;
pub const DEFAULT_NODE_BASE_PORT: u16 = 5001;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Room in a frame for the JSON envelope around a base64 file body.
const REPLY_ENVELOPE_LEN: u64 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file {0} not found")]
    Missing(PathBuf),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Host the directory binds to and clients/nodes connect to.
    pub directory_host: String,
    pub directory_port: u16,
    /// First port handed out to registering nodes; later nodes get the next ones.
    pub node_base_port: u16,
    /// Host a node advertises to the directory and binds its listener on.
    pub node_host: String,
    /// Storage root of a node. Every client path resolves inside it.
    pub storage_dir: PathBuf,
    /// Piece size used when streaming transfer payloads.
    pub chunk_size: usize,
    /// Largest payload accepted by a transfer or returned by `read`.
    pub max_file_size: u64,
    /// Largest accepted command frame body.
    pub max_frame_len: usize,
    pub heartbeat_interval_secs: u64,
    /// Age of the last heartbeat after which a node is evicted.
    pub eviction_threshold_secs: u64,
    pub connect_timeout_secs: u64,
    /// Bound on each individual read or write of a client exchange.
    pub io_timeout_secs: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            directory_host: DEFAULT_DIRECTORY_HOST.to_string(),
            directory_port: DEFAULT_DIRECTORY_PORT,
            node_base_port: DEFAULT_NODE_BASE_PORT,
            node_host: DEFAULT_DIRECTORY_HOST.to_string(),
            storage_dir: PathBuf::from("./node_storage"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            heartbeat_interval_secs: 30,
            eviction_threshold_secs: 60,
            connect_timeout_secs: 5,
            io_timeout_secs: 5,
        }
    }
}

impl ClusterConfig {
    /// Load defaults, the optional file at `path`, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("BIGFS").try_parsing(true));

        let loaded: ClusterConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.max_file_size == 0 || self.max_frame_len == 0 {
            return Err(ConfigError::Invalid(
                "max_file_size and max_frame_len must be positive".into(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be positive".into(),
            ));
        }
        if self.eviction_threshold_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "eviction_threshold_secs ({}) must exceed heartbeat_interval_secs ({})",
                self.eviction_threshold_secs, self.heartbeat_interval_secs
            )));
        }
        // A read reply carries a whole file as base64 in one frame.
        let largest_reply = self
            .max_file_size
            .div_ceil(3)
            .saturating_mul(4)
            .saturating_add(REPLY_ENVELOPE_LEN);
        if largest_reply > self.max_frame_len as u64 {
            return Err(ConfigError::Invalid(format!(
                "max_frame_len ({}) cannot hold a read reply for max_file_size ({}); \
                 it needs at least {} bytes",
                self.max_frame_len, self.max_file_size, largest_reply
            )));
        }
        Ok(())
    }

    /// False when a single missed heartbeat could already evict a node.
    pub fn tolerates_missed_heartbeat(&self) -> bool {
        self.eviction_threshold_secs >= self.heartbeat_interval_secs.saturating_mul(2)
    }

    pub fn directory_addr(&self) -> String {
        format!("{}:{}", self.directory_host, self.directory_port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn eviction_threshold(&self) -> Duration {
        Duration::from_secs(self.eviction_threshold_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}
