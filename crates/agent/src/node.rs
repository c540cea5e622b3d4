//! Node startup
//!
//! Open the storage root, register with the directory, bind the assigned
//! port, then serve and heartbeat in the background.

use bigfs_client::{ClientError, DirectoryClient};
use bigfs_files::{NodeStorage, PathGuardError};
use bigfs_types::{ClusterConfig, NodeId};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::info;

use crate::handler::CommandHandler;
use crate::heartbeat::spawn_heartbeat;
use crate::server::NodeServer;

/// Startup failures. Each one ends the node process.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("storage root unusable: {0}")]
    Storage(#[from] PathGuardError),
    #[error("registration with the directory failed: {0}")]
    Register(#[from] ClientError),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("node task stopped: {0}")]
    Task(#[from] JoinError),
}

/// A registered node serving in the background.
#[derive(Debug)]
pub struct RunningNode {
    pub node_id: NodeId,
    pub addr: SocketAddr,
    pub storage_root: PathBuf,
    server: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl RunningNode {
    /// Wait on the accept loop; it only returns if its task dies.
    pub async fn wait(self) -> Result<(), AgentError> {
        let result = self.server.await;
        self.heartbeat.abort();
        result.map_err(AgentError::from)
    }

    pub fn shutdown(self) {
        self.server.abort();
        self.heartbeat.abort();
    }
}

pub async fn start_node(config: &ClusterConfig) -> Result<RunningNode, AgentError> {
    let storage = NodeStorage::open(&config.storage_dir, config.max_file_size)?;
    let storage_root = storage.root().to_path_buf();

    let directory = DirectoryClient::from_cluster(config);
    let assignment = directory.register(&config.node_host).await?;
    info!(
        "Registered with directory {} as node {} (port {})",
        directory.addr(),
        assignment.node_id,
        assignment.port
    );

    let bind_addr = format!("{}:{}", config.node_host, assignment.port);
    let handler = Arc::new(CommandHandler::new(storage, config));
    let server = NodeServer::bind(&bind_addr, handler)
        .await
        .map_err(|source| AgentError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    let addr = server.local_addr().map_err(|source| AgentError::Bind {
        addr: bind_addr,
        source,
    })?;

    let heartbeat = spawn_heartbeat(directory, assignment.node_id, config.heartbeat_interval());
    let server = server.spawn();

    Ok(RunningNode {
        node_id: assignment.node_id,
        addr,
        storage_root,
        server,
        heartbeat,
    })
}
