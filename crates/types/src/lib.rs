//! BigFS shared types
//!
//! Plain data shared by the directory, the node agents and the clients.
//! Nothing here performs I/O except [`ClusterConfig::load`].

pub mod config;
pub mod fault;
pub mod file_entry;
pub mod node;

pub use config::{ClusterConfig, ConfigError};
pub use fault::{Fault, FaultKind};
pub use file_entry::FileEntry;
pub use node::{NodeId, NodeRecord, NodeStatus};
