use bigfs_network::{TransferError, WireError};
use bigfs_types::{Fault, NodeId};
use std::io;
use std::time::Duration;

/// Client errors
///
/// Local failures (timeouts, unreachable peers, broken framing) are kept
/// apart from faults the remote side reported on purpose.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("timed out after {after:?} during {stage} with {addr}")]
    Timeout {
        addr: String,
        stage: &'static str,
        after: Duration,
    },
    #[error("cannot reach {addr}: {source}")]
    Transport { addr: String, source: io::Error },
    #[error("protocol error with {addr}: {source}")]
    Protocol { addr: String, source: WireError },
    #[error("transfer with {addr} failed: {source}")]
    Transfer { addr: String, source: TransferError },
    #[error("{0}")]
    Remote(Fault),
    #[error("node {0} is not registered with the directory")]
    UnknownNode(NodeId),
    #[error("unexpected {reply} reply from {addr}")]
    UnexpectedReply { addr: String, reply: &'static str },
    #[error("local I/O error: {0}")]
    Local(#[from] io::Error),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// Fault reported by the remote side, if that is what went wrong.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ClientError::Remote(fault) => Some(fault),
            _ => None,
        }
    }

    pub(crate) fn wire(addr: &str, err: WireError) -> Self {
        match err {
            WireError::Io(source) => ClientError::Transport {
                addr: addr.to_string(),
                source,
            },
            source => ClientError::Protocol {
                addr: addr.to_string(),
                source,
            },
        }
    }

    pub(crate) fn transfer(addr: &str, err: TransferError) -> Self {
        match err {
            TransferError::Rejected(fault) => ClientError::Remote(fault),
            TransferError::TimedOut(after) => ClientError::Timeout {
                addr: addr.to_string(),
                stage: "transfer",
                after,
            },
            TransferError::Wire(err) => ClientError::wire(addr, err),
            source => ClientError::Transfer {
                addr: addr.to_string(),
                source,
            },
        }
    }
}
