//! BigFS Command Line Interface
//!
//! One-shot client: each invocation resolves the target node through the
//! directory and runs a single operation against it.

use anyhow::{Context, Result};
use bigfs_client::{DirectoryClient, NodeClient};
use bigfs_types::{ClusterConfig, FileEntry, NodeId, NodeRecord};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bigfs")]
#[command(about = "BigFS distributed file store client", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); BIGFS_* environment variables override it
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory address as host:port, overriding the configuration
    #[arg(long, global = true)]
    directory: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// List the live storage nodes
    Nodes,
    /// Create a file or directory on a node
    Mk {
        node: NodeId,
        path: String,
        /// Create a directory instead of a file
        #[arg(long)]
        dir: bool,
        /// Initial file content
        #[arg(long, conflicts_with = "dir")]
        content: Option<String>,
    },
    /// List a directory on a node
    Ls {
        node: NodeId,
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file's content
    Read { node: NodeId, path: String },
    /// Copy a file within a node
    Cp {
        node: NodeId,
        path: String,
        new_path: String,
    },
    /// Remove a file or directory (recursively)
    Rm { node: NodeId, path: String },
    /// Download a file from a node
    Get {
        node: NodeId,
        remote: String,
        /// Local destination; defaults to the remote file name
        local: Option<PathBuf>,
    },
    /// Upload a local file to a node
    Send {
        node: NodeId,
        local: PathBuf,
        /// Remote destination; defaults to the local file name
        remote: Option<String>,
    },
}

impl Commands {
    fn node(&self) -> Option<NodeId> {
        match self {
            Commands::Nodes => None,
            Commands::Mk { node, .. }
            | Commands::Ls { node, .. }
            | Commands::Read { node, .. }
            | Commands::Cp { node, .. }
            | Commands::Rm { node, .. }
            | Commands::Get { node, .. }
            | Commands::Send { node, .. } => Some(*node),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let directory = DirectoryClient::from_cluster(&config);

    let node = match cli.command.node() {
        Some(node_id) => Some(
            directory
                .node(node_id)
                .await
                .with_context(|| format!("Cannot reach node {node_id}"))?,
        ),
        None => None,
    };

    match (cli.command, node) {
        (Commands::Nodes, _) => {
            let nodes = directory
                .list_nodes()
                .await
                .context("Failed to query the directory")?;
            print!("{}", format_nodes(&nodes));
        }
        (command, Some(node)) => run_node_command(command, &node).await?,
        (command, None) => anyhow::bail!("{command:?} needs a node"),
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ClusterConfig> {
    let mut config =
        ClusterConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(directory) = &cli.directory {
        let (host, port) = directory
            .rsplit_once(':')
            .context("--directory must be host:port")?;
        config.directory_host = host.to_string();
        config.directory_port = port
            .parse()
            .with_context(|| format!("Invalid directory port {port:?}"))?;
    }
    Ok(config)
}

async fn run_node_command(command: Commands, node: &NodeClient) -> Result<()> {
    match command {
        Commands::Nodes => {}
        Commands::Mk {
            path,
            dir,
            content,
            ..
        } => {
            node.create(&path, dir, content.as_deref()).await?;
            println!("Created {path}");
        }
        Commands::Ls { path, .. } => {
            let entries = node.list(&path).await?;
            print!("{}", format_entries(&entries));
        }
        Commands::Read { path, .. } => {
            let data = node.read(&path).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Commands::Cp { path, new_path, .. } => {
            node.copy(&path, &new_path).await?;
            println!("Copied {path} to {new_path}");
        }
        Commands::Rm { path, .. } => {
            node.remove(&path).await?;
            println!("Removed {path}");
        }
        Commands::Get { remote, local, .. } => {
            let local = match local {
                Some(local) => local,
                None => PathBuf::from(remote_file_name(&remote)?),
            };
            let received = download(node, &remote, &local).await?;
            println!("Downloaded {remote} to {} ({received} bytes)", local.display());
        }
        Commands::Send { local, remote, .. } => {
            let remote = match remote {
                Some(remote) => remote,
                None => local
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .with_context(|| format!("{} has no usable file name", local.display()))?,
            };
            let mut file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("Failed to open {}", local.display()))?;
            let size = file.metadata().await?.len();
            node.push_from(&remote, &mut file, size).await?;
            println!("Uploaded {} to {remote} ({size} bytes)", local.display());
        }
    }
    Ok(())
}

/// Fetch into a temporary sibling of `local` and move it into place only
/// once the whole payload arrived; a failed download leaves `local` as it was.
async fn download(node: &NodeClient, remote: &str, local: &Path) -> Result<u64> {
    let parent = match local.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let (file, partial) = tempfile::Builder::new()
        .prefix(".bigfs-get")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create a temporary file in {}", parent.display()))?
        .into_parts();

    let mut file = tokio::fs::File::from_std(file);
    let received = node.fetch_into(remote, &mut file).await?;
    file.sync_all().await?;
    drop(file);

    partial
        .persist(local)
        .with_context(|| format!("Failed to write {}", local.display()))?;
    Ok(received)
}

fn remote_file_name(remote: &str) -> Result<&str> {
    remote
        .rsplit('/')
        .find(|part| !part.is_empty())
        .with_context(|| format!("{remote:?} has no file name"))
}

fn format_nodes(nodes: &BTreeMap<NodeId, NodeRecord>) -> String {
    if nodes.is_empty() {
        return "No active nodes\n".to_string();
    }
    let mut out = format!("{:<6} {:<22} {:<8} {}\n", "ID", "ADDRESS", "STATUS", "LAST SEEN");
    for (id, record) in nodes {
        out.push_str(&format!(
            "{:<6} {:<22} {:<8} {}\n",
            id.to_string(),
            record.address(),
            record.status.to_string(),
            record.last_seen.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}

fn format_entries(entries: &[FileEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            if entry.is_dir {
                format!("{:>10}  {}/\n", "-", entry.name)
            } else {
                format!("{:>10}  {}\n", entry.size, entry.name)
            }
        })
        .collect()
}
