//! Node accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handler::CommandHandler;

pub struct NodeServer {
    listener: TcpListener,
    handler: Arc<CommandHandler>,
}

impl NodeServer {
    pub async fn bind<A: ToSocketAddrs>(addr: A, handler: Arc<CommandHandler>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever, one task per connection.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!(
                "Node serving {} on {}",
                self.handler.storage().root().display(),
                addr
            ),
            Err(err) => warn!("Node listening on unknown address: {}", err),
        }

        loop {
            match self.listener.accept().await {
                Ok((mut stream, peer)) => {
                    debug!("Connection accepted from {}", peer);
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        handler.handle_connection(&mut stream, peer).await;
                    });
                }
                Err(err) => error!("Failed to accept node connection: {}", err),
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
