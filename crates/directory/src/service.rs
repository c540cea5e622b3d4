//! TCP front end of the directory.
//!
//! Task-per-connection. A connection may carry any number of framed
//! requests; it ends when the peer closes it, breaks framing, or stays
//! silent longer than the idle bound.

use bigfs_network::{
    decode, read_frame_bytes, write_frame, DirectoryReply, DirectoryRequest, WireError,
};
use bigfs_types::{Fault, FaultKind};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::registry::NodeRegistry;

pub struct DirectoryServer {
    listener: TcpListener,
    registry: Arc<NodeRegistry>,
    max_frame_len: usize,
    idle_timeout: Duration,
}

impl DirectoryServer {
    /// Bind the listening socket. Failing here is the only fatal error.
    ///
    /// A connection that sends nothing for `idle_timeout` is closed.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        registry: Arc<NodeRegistry>,
        max_frame_len: usize,
        idle_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry,
            max_frame_len,
            idle_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    /// Accept connections forever.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Directory listening on {}", addr),
            Err(err) => warn!("Directory listening on unknown address: {}", err),
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Connection accepted from {}", peer);
                    let registry = self.registry.clone();
                    let max_frame_len = self.max_frame_len;
                    let idle_timeout = self.idle_timeout;
                    tokio::spawn(async move {
                        handle_connection(registry, stream, peer, max_frame_len, idle_timeout)
                            .await;
                    });
                }
                Err(err) => error!("Failed to accept directory connection: {}", err),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn handle_connection(
    registry: Arc<NodeRegistry>,
    mut stream: TcpStream,
    peer: SocketAddr,
    max_frame_len: usize,
    idle_timeout: Duration,
) {
    loop {
        let read = timeout(idle_timeout, read_frame_bytes(&mut stream, max_frame_len));
        let body = match read.await {
            Ok(Ok(body)) => body,
            Ok(Err(WireError::Closed)) => break,
            Ok(Err(err)) => {
                warn!("Dropping directory connection from {}: {}", peer, err);
                break;
            }
            Err(_) => {
                debug!("Closing directory connection from {} after {:?} idle", peer, idle_timeout);
                break;
            }
        };

        let reply = match decode::<DirectoryRequest>(&body) {
            Ok(request) => handle_request(&registry, request),
            Err(err) => DirectoryReply::Error {
                fault: Fault::validation(format!("unrecognized directory request: {err}")),
            },
        };

        if let Err(err) = write_frame(&mut stream, &reply).await {
            debug!("Failed to reply to {}: {}", peer, err);
            break;
        }
    }
}

/// Apply one request to the registry.
pub fn handle_request(registry: &NodeRegistry, request: DirectoryRequest) -> DirectoryReply {
    match request {
        DirectoryRequest::Register { host } => match registry.register(&host) {
            Ok(registration) => DirectoryReply::Registered {
                node_id: registration.node_id,
                port: registration.port,
            },
            Err(err) => DirectoryReply::Error {
                fault: Fault::new(FaultKind::Io, err.to_string()),
            },
        },
        DirectoryRequest::Heartbeat { node_id } => {
            if !registry.heartbeat(node_id) {
                debug!("Ignoring heartbeat from unknown node {}", node_id);
            }
            DirectoryReply::Ack
        }
        DirectoryRequest::ListNodes => DirectoryReply::Nodes {
            nodes: registry.snapshot().into_values().collect(),
        },
    }
}
