//! Reconcile host
//!
//! Owns the shared node context and composes the reconcilers: starts
//! the evicted-set sweeper and the extension plugins, waits for the
//! states informer's initial sync, then spawns one feature-gate runner
//! per reconciler and blocks until the shutdown signal fires.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::audit::AuditSink;
use crate::config::ResManagerConfig;
use crate::cpu_evict::CpuEvictor;
use crate::events::{EventRecorder, EventSink};
use crate::evict::PodEvictor;
use crate::expire_cache::ExpireCache;
use crate::features::FeatureGates;
use crate::kubeclient::{EvictVersion, EvictionClient};
use crate::memory_evict::MemoryEvictor;
use crate::metriccache::MetricCache;
use crate::plugins::PluginRegistry;
use crate::runner::{run_feature, Reconciler};
use crate::runtime::RuntimeRegistry;
use crate::statesinformer::{wait_for_cache_sync, StatesInformer};

/// Component name stamped on emitted events.
pub const COMPONENT_NAME: &str = "koordlet-resmanager";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("timed out waiting for states informer caches to sync")]
    SyncTimeout,
}

/// Shared state handed to every reconciler.
///
/// Read-only except for the evicted set behind the evictor, which is
/// internally synchronized.
pub struct NodeContext {
    pub node_name: String,
    pub config: ResManagerConfig,
    pub states_informer: Arc<dyn StatesInformer>,
    pub metric_cache: Arc<dyn MetricCache>,
    pub runtime_registry: Arc<RuntimeRegistry>,
    pub evictor: Arc<PodEvictor>,
}

/// The node-local resource manager.
pub struct ResManager {
    config: ResManagerConfig,
    node_name: String,
    gates: FeatureGates,
    states_informer: Arc<dyn StatesInformer>,
    metric_cache: Arc<dyn MetricCache>,
    runtime_registry: Arc<RuntimeRegistry>,
    pods_evicted: Arc<ExpireCache<String>>,
    evictor: Arc<PodEvictor>,
    plugins: PluginRegistry,
}

impl ResManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ResManagerConfig,
        gates: FeatureGates,
        node_name: impl Into<String>,
        kube_client: Arc<dyn EvictionClient>,
        states_informer: Arc<dyn StatesInformer>,
        metric_cache: Arc<dyn MetricCache>,
        runtime_registry: Arc<RuntimeRegistry>,
        event_sink: Arc<dyn EventSink>,
        audit_sink: Arc<dyn AuditSink>,
        plugins: PluginRegistry,
        evict_version: EvictVersion,
    ) -> Self {
        let node_name = node_name.into();
        let recorder = EventRecorder::new(event_sink, COMPONENT_NAME, node_name.clone());
        let pods_evicted = Arc::new(ExpireCache::default());
        let evictor = Arc::new(PodEvictor::new(
            kube_client,
            recorder,
            audit_sink,
            pods_evicted.clone(),
            evict_version,
        ));

        Self {
            config,
            node_name,
            gates,
            states_informer,
            metric_cache,
            runtime_registry,
            pods_evicted,
            evictor,
            plugins,
        }
    }

    /// Run the manager until the shutdown signal fires.
    ///
    /// Returns immediately when the collection interval disables the
    /// manager, and with [`RunError::SyncTimeout`] when the states
    /// informer never completes its initial sync.
    pub async fn run(&self, shutdown: broadcast::Sender<()>) -> Result<(), RunError> {
        if self.config.collect_res_used_interval_seconds < 1 {
            info!(
                collect_interval = self.config.collect_res_used_interval_seconds,
                "Resource manager is disabled"
            );
            return Ok(());
        }

        info!(node = %self.node_name, "Starting resmanager");

        let _sweeper = self.pods_evicted.clone().run(shutdown.subscribe());

        self.plugins
            .start_all(&self.config.qos_extension_cfg, &shutdown)
            .await;

        let mut shutdown_rx = shutdown.subscribe();
        let sync_timeout = Duration::from_secs(self.config.states_sync_timeout_seconds);
        if !wait_for_cache_sync(self.states_informer.as_ref(), sync_timeout, &mut shutdown_rx)
            .await
        {
            return Err(RunError::SyncTimeout);
        }

        let context = Arc::new(NodeContext {
            node_name: self.node_name.clone(),
            config: self.config.clone(),
            states_informer: self.states_informer.clone(),
            metric_cache: self.metric_cache.clone(),
            runtime_registry: self.runtime_registry.clone(),
            evictor: self.evictor.clone(),
        });

        let memory_evictor: Arc<dyn Reconciler> = Arc::new(MemoryEvictor::new(context.clone()));
        tokio::spawn(run_feature(
            memory_evictor,
            self.gates.clone(),
            shutdown.subscribe(),
        ));

        let cpu_evictor: Arc<dyn Reconciler> = Arc::new(CpuEvictor::new(context.clone()));
        tokio::spawn(run_feature(
            cpu_evictor,
            self.gates.clone(),
            shutdown.subscribe(),
        ));

        info!(node = %self.node_name, "Started resmanager");

        let _ = shutdown_rx.recv().await;
        info!(node = %self.node_name, "Shutting down resmanager");
        Ok(())
    }
}
