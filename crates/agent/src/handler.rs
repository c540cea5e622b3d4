//! Command handling
//!
//! ```text
//! receive ──▶ validate ──▶ dispatch ──▶ respond ──▶ close
//! ```
//!
//! A connection carries exactly one command. Anything that goes wrong after
//! the command is decoded is reported to the client as a [`Fault`]; broken
//! framing ends the connection without touching the filesystem.

use bigfs_files::NodeStorage;
use bigfs_network::{
    acknowledge, decode, read_declaration, read_frame_bytes, receive_body, refuse,
    send_payload, write_frame, Command, Reply, TransferError, TransferLimits, WireError,
};
use bigfs_types::{ClusterConfig, Fault};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CommandHandler {
    storage: NodeStorage,
    limits: TransferLimits,
    io_timeout: Duration,
}

impl CommandHandler {
    pub fn new(storage: NodeStorage, config: &ClusterConfig) -> Self {
        let limits = TransferLimits::new(
            config.chunk_size,
            config.max_file_size,
            config.max_frame_len,
        )
        .with_idle_timeout(config.io_timeout());
        Self::with_limits(storage, limits, config.io_timeout())
    }

    pub fn with_limits(storage: NodeStorage, limits: TransferLimits, io_timeout: Duration) -> Self {
        Self {
            storage,
            limits,
            io_timeout,
        }
    }

    pub fn storage(&self) -> &NodeStorage {
        &self.storage
    }

    /// Serve the single command carried by `stream`.
    pub async fn handle_connection<S>(&self, stream: &mut S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let body = match timeout(
            self.io_timeout,
            read_frame_bytes(stream, self.limits.max_frame_len),
        )
        .await
        {
            Ok(Ok(body)) => body,
            Ok(Err(WireError::Closed)) => {
                debug!("{} closed without sending a command", peer);
                return;
            }
            Ok(Err(err)) => {
                warn!("Dropping connection from {}: {}", peer, err);
                return;
            }
            Err(_) => {
                warn!("No command from {} within {:?}", peer, self.io_timeout);
                return;
            }
        };

        let command = match decode::<Command>(&body) {
            Ok(command) => command,
            Err(err) => {
                debug!("Undecodable command from {}: {}", peer, err);
                let fault = Fault::validation(format!("unrecognized command: {err}"));
                self.respond(stream, peer, &Reply::error(fault)).await;
                return;
            }
        };
        debug!("{} {:?} from {}", command.name(), command.path(), peer);

        let result = match command {
            Command::Fetch { path } => return self.fetch(stream, peer, &path).await,
            Command::Push { file_name } => return self.push(stream, peer, &file_name).await,
            Command::List { path } => self.list(&path).await,
            Command::Create {
                path,
                is_dir,
                content,
            } => self.create(&path, is_dir, content.as_deref()).await,
            Command::Read { path } => self.read(&path).await,
            Command::Copy { path, new_path } => self.copy(&path, &new_path).await,
            Command::Remove { path } => self.remove(&path).await,
        };

        let reply = result.unwrap_or_else(|fault| {
            debug!("Command from {} failed: {}", peer, fault);
            Reply::error(fault)
        });
        self.respond(stream, peer, &reply).await;
    }

    async fn list(&self, path: &str) -> Result<Reply, Fault> {
        let target = self.storage.resolve(path)?;
        let files = self.storage.list(&target).await?;
        Ok(Reply::Entries { files })
    }

    async fn create(
        &self,
        path: &str,
        is_dir: bool,
        content: Option<&str>,
    ) -> Result<Reply, Fault> {
        let target = self.storage.resolve(path)?;
        self.storage.create(&target, is_dir, content).await?;
        Ok(Reply::Ok)
    }

    async fn read(&self, path: &str) -> Result<Reply, Fault> {
        let target = self.storage.resolve(path)?;
        let data = self.storage.read(&target).await?;
        Ok(Reply::Content { data })
    }

    async fn copy(&self, path: &str, new_path: &str) -> Result<Reply, Fault> {
        let source = self.storage.resolve(path)?;
        let destination = self.storage.resolve(new_path)?;
        self.storage.copy(&source, &destination).await?;
        Ok(Reply::Ok)
    }

    async fn remove(&self, path: &str) -> Result<Reply, Fault> {
        let target = self.storage.resolve(path)?;
        self.storage.remove(&target).await?;
        Ok(Reply::Ok)
    }

    /// Stream a stored file to the client; failures before the first byte
    /// are reported with an `Abort` frame.
    async fn fetch<S>(&self, stream: &mut S, peer: SocketAddr, path: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let opened = match self.storage.resolve(path) {
            Ok(target) => self.storage.open_download(&target).await,
            Err(fault) => Err(fault),
        };
        let (mut file, size) = match opened {
            Ok(opened) => opened,
            Err(fault) => {
                debug!("Refusing fetch of {:?} from {}: {}", path, peer, fault);
                self.abort(stream, peer, fault).await;
                return;
            }
        };

        match send_payload(stream, &mut file, size, &self.limits).await {
            Ok(()) => info!("Sent {:?} ({} bytes) to {}", path, size, peer),
            Err(TransferError::Rejected(fault)) => {
                debug!("{} declined fetch of {:?}: {}", peer, path, fault)
            }
            Err(err) => warn!("Fetch of {:?} by {} failed: {}", path, peer, err),
        }
    }

    /// Receive a file from the client. The declaration is always read
    /// before any rejection is sent.
    async fn push<S>(&self, stream: &mut S, peer: SocketAddr, file_name: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let declared = match timeout(
            self.io_timeout,
            read_declaration(stream, self.limits.max_frame_len),
        )
        .await
        {
            Ok(Ok(size)) => size,
            Ok(Err(err)) => {
                warn!("Push of {:?} from {} abandoned: {}", file_name, peer, err);
                return;
            }
            Err(_) => {
                warn!("No transfer declaration from {} within {:?}", peer, self.io_timeout);
                return;
            }
        };

        let destination = match self
            .storage
            .resolve(file_name)
            .and_then(|target| self.storage.check_size(declared).map(|()| target))
        {
            Ok(target) => target,
            Err(fault) => {
                debug!("Refusing push of {:?} from {}: {}", file_name, peer, fault);
                self.abort(stream, peer, fault).await;
                return;
            }
        };

        let mut upload = match self.storage.begin_upload(&destination).await {
            Ok(upload) => upload,
            Err(fault) => {
                self.abort(stream, peer, fault).await;
                return;
            }
        };

        let accepted = match timeout(self.io_timeout, acknowledge(stream)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::TimedOut(self.io_timeout)),
        };
        if let Err(err) = accepted {
            warn!("Could not accept push from {}: {}", peer, err);
            upload.discard().await;
            return;
        }

        match receive_body(stream, upload.file_mut(), declared, &self.limits).await {
            Ok(received) => match upload.commit().await {
                Ok(()) => {
                    info!("Stored {:?} ({} bytes) from {}", file_name, received, peer);
                    self.respond(stream, peer, &Reply::Ok).await;
                }
                Err(fault) => {
                    warn!("Could not persist push of {:?}: {}", file_name, fault);
                    self.respond(stream, peer, &Reply::error(fault)).await;
                }
            },
            Err(err) => {
                warn!("Push of {:?} from {} failed: {}", file_name, peer, err);
                upload.discard().await;
                self.respond(stream, peer, &Reply::error(err.to_fault()))
                    .await;
            }
        }
    }

    async fn abort<S>(&self, stream: &mut S, peer: SocketAddr, fault: Fault)
    where
        S: AsyncWrite + Unpin,
    {
        match timeout(self.io_timeout, refuse(stream, fault)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("Failed to send abort to {}: {}", peer, err),
            Err(_) => debug!("Timed out sending abort to {}", peer),
        }
    }

    async fn respond<S>(&self, stream: &mut S, peer: SocketAddr, reply: &Reply)
    where
        S: AsyncWrite + Unpin,
    {
        match timeout(self.io_timeout, write_frame(stream, reply)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("Failed to reply to {}: {}", peer, err),
            Err(_) => debug!("Timed out replying to {}", peer),
        }
    }
}
