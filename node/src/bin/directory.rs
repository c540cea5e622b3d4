//! BigFS directory daemon.

use anyhow::{Context, Result};
use bigfs_directory::{DirectoryServer, NodeRegistry};
use bigfs_node::{check_config, init_logging, CommonArgs};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "bigfs-directory")]
#[command(about = "BigFS directory service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// First port handed out to registering nodes
    #[arg(long)]
    node_base_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common.log_level, cli.common.log_format)?;

    let mut config = cli.common.load_config()?;
    if let Some(port) = cli.node_base_port {
        config.node_base_port = port;
    }
    check_config(&config)?;

    let registry = Arc::new(NodeRegistry::new(
        config.node_base_port,
        config.eviction_threshold(),
    ));
    let addr = config.directory_addr();
    let server = DirectoryServer::bind(&addr, registry, config.max_frame_len, config.io_timeout())
        .await
        .with_context(|| format!("Failed to bind directory on {addr}"))?;
    info!(
        "Directory ready; nodes get ports from {}, evicted after {}s of silence",
        config.node_base_port, config.eviction_threshold_secs
    );

    tokio::select! {
        () = server.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down directory");
        }
    }
    Ok(())
}
