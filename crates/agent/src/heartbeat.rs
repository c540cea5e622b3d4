//! Liveness refresh.
//!
//! Runs for the life of the process. A failed heartbeat is logged and the
//! next tick tries again; if the directory evicted the node meanwhile, the
//! heartbeat is ignored there and the node stays unlisted.

use bigfs_client::DirectoryClient;
use bigfs_types::NodeId;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

pub fn spawn_heartbeat(
    directory: DirectoryClient,
    node_id: NodeId,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Registration already stamped last_seen; skip the immediate tick.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match directory.heartbeat(node_id).await {
                Ok(()) => debug!("Heartbeat sent for node {}", node_id),
                Err(err) => warn!("Heartbeat for node {} failed: {}", node_id, err),
            }
        }
    })
}
