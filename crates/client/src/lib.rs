//! BigFS Client
//!
//! Async client for the directory and for storage nodes. Every connection is
//! opened with a bounded connect timeout and every read or write is bounded
//! by the configured I/O timeout. Nothing is retried.
//!
//! ## Modules
//! - `connection`: timeouts and the framed request/reply exchange
//! - `directory`: registration, heartbeat and node table lookups
//! - `node`: the seven file operations against one node
//! - `error`: client error taxonomy

pub mod connection;
pub mod directory;
pub mod error;
pub mod node;

pub use connection::ConnectionConfig;
pub use directory::{DirectoryClient, NodeAssignment};
pub use error::ClientError;
pub use node::NodeClient;
