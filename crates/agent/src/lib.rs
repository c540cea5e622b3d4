//! BigFS Node Agent
//!
//! Serves file commands on one storage node and keeps the node registered
//! with the directory.
//!
//! ## Modules
//! - `handler`: one command per connection, path guard before every access
//! - `server`: accept loop, one task per connection
//! - `heartbeat`: periodic liveness refresh
//! - `node`: startup sequence tying the pieces together

pub mod handler;
pub mod heartbeat;
pub mod node;
pub mod server;

pub use handler::CommandHandler;
pub use heartbeat::spawn_heartbeat;
pub use node::{start_node, AgentError, RunningNode};
pub use server::NodeServer;
