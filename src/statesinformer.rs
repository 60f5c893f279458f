//! Consumed states-informer interface
//!
//! The informer maintains the node-local cache of pods, the node object
//! and the node SLO. It is owned elsewhere; this crate only reads
//! through the accessor trait and waits for the initial sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::models::{Node, NodeSLO, Pod};

/// Poll period while waiting for the initial cache sync.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read-only view of the informer caches.
///
/// All accessors return immutable snapshots; `get_node_slo` never
/// returns `None` once `has_synced` reports true.
pub trait StatesInformer: Send + Sync {
    fn has_synced(&self) -> bool;

    fn get_node_slo(&self) -> Option<Arc<NodeSLO>>;

    /// May be `None` until the initial sync completes.
    fn get_node(&self) -> Option<Arc<Node>>;

    fn get_all_pods(&self) -> Vec<Arc<Pod>>;
}

/// Block until the informer reports synced, the timeout elapses or the
/// shutdown signal fires. Returns whether the sync completed.
pub async fn wait_for_cache_sync(
    informer: &dyn StatesInformer,
    timeout: Duration,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if informer.has_synced() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
            _ = shutdown.recv() => {
                debug!("Shutdown while waiting for states informer sync");
                return false;
            }
        }
    }
}
