//! Shared bootstrap for the BigFS daemons: command-line overrides,
//! configuration loading and logging setup.

use anyhow::{Context, Result};
use bigfs_types::ClusterConfig;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Flags common to both daemons.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Configuration file (TOML); BIGFS_* environment variables override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory host
    #[arg(long)]
    pub directory_host: Option<String>,

    /// Directory port
    #[arg(long)]
    pub directory_port: Option<u16>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: String,

    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl CommonArgs {
    /// Load the layered configuration and apply the command-line overrides.
    pub fn load_config(&self) -> Result<ClusterConfig> {
        let mut config = ClusterConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        if let Some(host) = &self.directory_host {
            config.directory_host = host.clone();
        }
        if let Some(port) = self.directory_port {
            config.directory_port = port;
        }
        Ok(config)
    }
}

/// Validate once more after overrides and warn about fragile liveness settings.
pub fn check_config(config: &ClusterConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    if !config.tolerates_missed_heartbeat() {
        warn!(
            "Eviction threshold {}s is less than twice the heartbeat interval {}s; \
             a single late heartbeat will evict a node",
            config.eviction_threshold_secs, config.heartbeat_interval_secs
        );
    }
    Ok(())
}

pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    }
    .context("Failed to initialise logging")
}
