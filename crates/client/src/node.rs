//! Node client: one command per connection.

use bigfs_network::{receive_payload, send_payload, Command, Reply};
use bigfs_types::FileEntry;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct NodeClient {
    addr: String,
    config: ConnectionConfig,
}

impl NodeClient {
    pub fn new(addr: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self, command: &Command) -> Result<Connection, ClientError> {
        let mut connection = Connection::open(&self.addr, &self.config).await?;
        debug!("Sending {} to {}", command.name(), self.addr);
        connection.send(command).await?;
        Ok(connection)
    }

    /// Run a command that is answered by a single reply.
    async fn execute(&self, command: Command) -> Result<Reply, ClientError> {
        let mut connection = self.connect(&command).await?;
        let reply: Reply = connection.receive().await?;
        reply.into_result().map_err(ClientError::Remote)
    }

    fn unexpected(&self, reply: &Reply) -> ClientError {
        ClientError::UnexpectedReply {
            addr: self.addr.clone(),
            reply: reply.kind(),
        }
    }

    fn expect_ok(&self, reply: Reply) -> Result<(), ClientError> {
        match reply {
            Reply::Ok => Ok(()),
            other => Err(self.unexpected(&other)),
        }
    }

    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, ClientError> {
        match self
            .execute(Command::List {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Entries { files } => Ok(files),
            other => Err(self.unexpected(&other)),
        }
    }

    pub async fn create(
        &self,
        path: &str,
        is_dir: bool,
        content: Option<&str>,
    ) -> Result<(), ClientError> {
        let reply = self
            .execute(Command::Create {
                path: path.to_string(),
                is_dir,
                content: content.map(str::to_string),
            })
            .await?;
        self.expect_ok(reply)
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        match self
            .execute(Command::Read {
                path: path.to_string(),
            })
            .await?
        {
            Reply::Content { data } => Ok(data),
            other => Err(self.unexpected(&other)),
        }
    }

    pub async fn copy(&self, path: &str, new_path: &str) -> Result<(), ClientError> {
        let reply = self
            .execute(Command::Copy {
                path: path.to_string(),
                new_path: new_path.to_string(),
            })
            .await?;
        self.expect_ok(reply)
    }

    pub async fn remove(&self, path: &str) -> Result<(), ClientError> {
        let reply = self
            .execute(Command::Remove {
                path: path.to_string(),
            })
            .await?;
        self.expect_ok(reply)
    }

    /// Download `path` into `sink`; returns the number of bytes received.
    pub async fn fetch_into<W>(&self, path: &str, sink: &mut W) -> Result<u64, ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut connection = self
            .connect(&Command::Fetch {
                path: path.to_string(),
            })
            .await?;
        receive_payload(connection.stream_mut(), sink, &self.config.transfer)
            .await
            .map_err(|err| ClientError::transfer(connection.addr(), err))
    }

    pub async fn fetch(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let mut data = Vec::new();
        self.fetch_into(path, &mut data).await?;
        Ok(data)
    }

    /// Upload exactly `size` bytes from `source` to `file_name` on the node.
    pub async fn push_from<R>(
        &self,
        file_name: &str,
        source: &mut R,
        size: u64,
    ) -> Result<(), ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let mut connection = self
            .connect(&Command::Push {
                file_name: file_name.to_string(),
            })
            .await?;
        send_payload(connection.stream_mut(), source, size, &self.config.transfer)
            .await
            .map_err(|err| ClientError::transfer(connection.addr(), err))?;

        let reply: Reply = connection.receive().await?;
        let reply = reply.into_result().map_err(ClientError::Remote)?;
        self.expect_ok(reply)
    }

    pub async fn push(&self, file_name: &str, data: &[u8]) -> Result<(), ClientError> {
        let mut source = data;
        self.push_from(file_name, &mut source, data.len() as u64)
            .await
    }
}
