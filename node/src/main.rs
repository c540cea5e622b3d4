//! BigFS storage node daemon.

use anyhow::{Context, Result};
use bigfs_agent::start_node;
use bigfs_node::{check_config, init_logging, CommonArgs};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "bigfs-node")]
#[command(about = "BigFS storage node", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// Host this node advertises to the directory and listens on
    #[arg(long)]
    host: Option<String>,

    /// Storage root directory
    #[arg(short, long, value_name = "DIR")]
    storage_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common.log_level, cli.common.log_format)?;

    let mut config = cli.common.load_config()?;
    if let Some(host) = cli.host {
        config.node_host = host;
    }
    if let Some(storage_dir) = cli.storage_dir {
        config.storage_dir = storage_dir;
    }
    check_config(&config)?;

    let node = start_node(&config)
        .await
        .context("Failed to start storage node")?;
    info!(
        "Node {} ready on {} with storage at {}",
        node.node_id,
        node.addr,
        node.storage_root.display()
    );

    tokio::select! {
        result = node.wait() => result.context("Storage node stopped unexpectedly")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down storage node");
        }
    }
    Ok(())
}
