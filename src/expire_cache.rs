//! Bounded-TTL key set used as an idempotence barrier
//!
//! Entries inserted with the default TTL stop being visible to `get`
//! the moment they expire; a background sweeper reclaims the memory.
//! The store is not a cache of truth, only a "recently acted on" record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default entry lifetime
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5 * 60);

/// How often the sweeper reclaims expired entries
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key/value store with per-entry expiration.
///
/// `get` never returns an expired entry regardless of sweeper timing.
#[derive(Debug)]
pub struct ExpireCache<V> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V> Default for ExpireCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRATION)
    }
}

impl<V> ExpireCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Insert with the default TTL, replacing any previous entry.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn sweep(&self) {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Swept expired entries");
        }
    }

    /// Start the background sweeper. Stops when the shutdown signal fires.
    pub fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            // The immediate first tick would sweep an empty store.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.sweep(),
                    _ = shutdown.recv() => {
                        debug!("Shutting down expire cache sweeper");
                        break;
                    }
                }
            }
        })
    }
}
