//! In-memory node registry.
//!
//! The table and both allocation counters live in one struct behind one
//! mutex, so allocating an id/port pair and inserting the record is a single
//! step, and an eviction sweep never interleaves with another reader.

use bigfs_types::{NodeId, NodeRecord};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub node_id: NodeId,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no node ports left to assign")]
    PortsExhausted,
}

#[derive(Debug)]
struct RegistryState {
    nodes: BTreeMap<NodeId, NodeRecord>,
    next_id: NodeId,
    // Wider than u16 so the value past 65535 is representable and refused.
    next_port: u32,
}

/// Registry of live storage nodes.
#[derive(Debug)]
pub struct NodeRegistry {
    state: Mutex<RegistryState>,
    eviction_threshold: chrono::Duration,
}

impl NodeRegistry {
    pub fn new(base_port: u16, eviction_threshold: Duration) -> Self {
        let eviction_threshold =
            chrono::Duration::from_std(eviction_threshold).unwrap_or(chrono::Duration::MAX);
        Self {
            state: Mutex::new(RegistryState {
                nodes: BTreeMap::new(),
                next_id: NodeId::FIRST,
                next_port: u32::from(base_port),
            }),
            eviction_threshold,
        }
    }

    /// Register a node reachable at `host`.
    ///
    /// Always mints a fresh id, even when `host` is already registered.
    pub fn register(&self, host: &str) -> Result<Registration, RegistryError> {
        self.register_at(host, Utc::now())
    }

    pub fn register_at(
        &self,
        host: &str,
        now: DateTime<Utc>,
    ) -> Result<Registration, RegistryError> {
        let mut state = self.state.lock();

        let port = u16::try_from(state.next_port).map_err(|_| RegistryError::PortsExhausted)?;
        let node_id = state.next_id;
        state.next_port += 1;
        state.next_id = node_id.next();

        state
            .nodes
            .insert(node_id, NodeRecord::new(node_id, host, port, now));
        info!("Node {} registered at {}:{}", node_id, host, port);

        Ok(Registration { node_id, port })
    }

    /// Refresh liveness. Returns whether the id was known; unknown ids
    /// (never registered or already evicted) are ignored.
    pub fn heartbeat(&self, node_id: NodeId) -> bool {
        self.heartbeat_at(node_id, Utc::now())
    }

    pub fn heartbeat_at(&self, node_id: NodeId, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        match state.nodes.get_mut(&node_id) {
            Some(record) => {
                record.last_seen = now;
                debug!("Heartbeat from node {}", node_id);
                true
            }
            None => false,
        }
    }

    /// Evict stale nodes, then return the remaining table.
    pub fn snapshot(&self) -> BTreeMap<NodeId, NodeRecord> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> BTreeMap<NodeId, NodeRecord> {
        let mut state = self.state.lock();
        let threshold = self.eviction_threshold;

        state.nodes.retain(|node_id, record| {
            let stale = record.is_stale(now, threshold);
            if stale {
                info!("Node {} removed for inactivity", node_id);
            }
            !stale
        });

        state.nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
