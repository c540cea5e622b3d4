//! Timed connections
//!
//! A [`Connection`] is one TCP stream to a directory or node. Connecting is
//! bounded by `connect_timeout`; each frame read or write, and each chunk of
//! a transfer, is bounded by `io_timeout`.

use bigfs_network::{read_frame, write_frame, TransferLimits, WireError};
use bigfs_types::ClusterConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use tracing::debug;

use crate::error::ClientError;

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub transfer: TransferLimits,
}

impl ConnectionConfig {
    pub fn from_cluster(config: &ClusterConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
            transfer: TransferLimits::new(
                config.chunk_size,
                config.max_file_size,
                config.max_frame_len,
            )
            .with_idle_timeout(config.io_timeout()),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_cluster(&ClusterConfig::default())
    }
}

pub(crate) struct Connection {
    addr: String,
    stream: TcpStream,
    io_timeout: Duration,
    max_frame_len: usize,
}

impl Connection {
    pub(crate) async fn open(addr: &str, config: &ConnectionConfig) -> Result<Self, ClientError> {
        let stream = match timeout(config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Transport {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ClientError::Timeout {
                    addr: addr.to_string(),
                    stage: "connect",
                    after: config.connect_timeout,
                })
            }
        };
        debug!("Connected to {}", addr);

        Ok(Self {
            addr: addr.to_string(),
            stream,
            io_timeout: config.io_timeout,
            max_frame_len: config.transfer.max_frame_len,
        })
    }

    pub(crate) fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub(crate) async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ClientError> {
        let result = timeout(self.io_timeout, write_frame(&mut self.stream, message)).await;
        settle(&self.addr, "write", self.io_timeout, result)
    }

    pub(crate) async fn receive<T: DeserializeOwned>(&mut self) -> Result<T, ClientError> {
        let result = timeout(
            self.io_timeout,
            read_frame(&mut self.stream, self.max_frame_len),
        )
        .await;
        settle(&self.addr, "read", self.io_timeout, result)
    }

    /// Send one request frame and wait for its reply frame.
    pub(crate) async fn call<Req, Resp>(&mut self, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.send(request).await?;
        self.receive().await
    }
}

fn settle<T>(
    addr: &str,
    stage: &'static str,
    after: Duration,
    result: Result<Result<T, WireError>, Elapsed>,
) -> Result<T, ClientError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ClientError::wire(addr, err)),
        Err(_) => Err(ClientError::Timeout {
            addr: addr.to_string(),
            stage,
            after,
        }),
    }
}
