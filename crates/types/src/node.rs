use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier handed out by the directory on registration.
///
/// Ids are allocated from a monotonically increasing counter starting at 1
/// and are never reused, even after the node is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const FIRST: NodeId = NodeId(1);

    pub fn next(self) -> Self {
        NodeId(self.0 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(NodeId)
    }
}

/// Liveness status reported for a node.
///
/// Only active nodes are ever stored; a node that stops refreshing its
/// liveness is removed rather than demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Active => f.write_str("active"),
        }
    }
}

/// Directory entry describing one registered storage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16, now: DateTime<Utc>) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            status: NodeStatus::Active,
            last_seen: now,
        }
    }

    /// `host:port` string suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when the record has not been refreshed for longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > threshold
    }
}
