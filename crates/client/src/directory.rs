//! Directory client

use bigfs_network::{DirectoryReply, DirectoryRequest};
use bigfs_types::{ClusterConfig, NodeId, NodeRecord};
use std::collections::BTreeMap;
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use crate::node::NodeClient;

/// Id and listening port handed to a node by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAssignment {
    pub node_id: NodeId,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    addr: String,
    config: ConnectionConfig,
}

impl DirectoryClient {
    pub fn new(addr: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    pub fn from_cluster(config: &ClusterConfig) -> Self {
        Self::new(config.directory_addr(), ConnectionConfig::from_cluster(config))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn call(&self, request: DirectoryRequest) -> Result<DirectoryReply, ClientError> {
        let mut connection = Connection::open(&self.addr, &self.config).await?;
        match connection.call(&request).await? {
            DirectoryReply::Error { fault } => Err(ClientError::Remote(fault)),
            reply => Ok(reply),
        }
    }

    fn unexpected(&self, reply: &DirectoryReply) -> ClientError {
        ClientError::UnexpectedReply {
            addr: self.addr.clone(),
            reply: reply.kind(),
        }
    }

    pub async fn register(&self, host: &str) -> Result<NodeAssignment, ClientError> {
        match self
            .call(DirectoryRequest::Register {
                host: host.to_string(),
            })
            .await?
        {
            DirectoryReply::Registered { node_id, port } => Ok(NodeAssignment { node_id, port }),
            other => Err(self.unexpected(&other)),
        }
    }

    pub async fn heartbeat(&self, node_id: NodeId) -> Result<(), ClientError> {
        match self.call(DirectoryRequest::Heartbeat { node_id }).await? {
            DirectoryReply::Ack => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Current node table, after the directory's eviction sweep.
    pub async fn list_nodes(&self) -> Result<BTreeMap<NodeId, NodeRecord>, ClientError> {
        match self.call(DirectoryRequest::ListNodes).await? {
            DirectoryReply::Nodes { nodes } => Ok(nodes
                .into_iter()
                .map(|record| (record.id, record))
                .collect()),
            other => Err(self.unexpected(&other)),
        }
    }

    /// Look `node_id` up in the table and return a client for it.
    pub async fn node(&self, node_id: NodeId) -> Result<NodeClient, ClientError> {
        let nodes = self.list_nodes().await?;
        let record = nodes
            .get(&node_id)
            .ok_or(ClientError::UnknownNode(node_id))?;
        debug!("Node {} resolved to {}", node_id, record.address());
        Ok(NodeClient::new(record.address(), self.config.clone()))
    }
}
