//! Eviction executor
//!
//! At-most-once pod eviction per UID per TTL window. The executor
//! dedupes through the expiring key set, writes an audit record, calls
//! the cluster API with a UID precondition and emits the matching
//! event. A failed call leaves no trace in the key set so the next tick
//! may retry.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::audit::{AuditRecord, AuditSink};
use crate::events::{EventRecorder, EventType};
use crate::expire_cache::ExpireCache;
use crate::kubeclient::{DeleteOptions, EvictVersion, EvictionClient, Preconditions};
use crate::models::{Node, Pod};
use crate::observability::ResManagerMetrics;

pub const EVICT_POD_SUCCESS: &str = "evictPodSuccess";
pub const EVICT_POD_FAIL: &str = "evictPodFail";

/// Eviction reason used by the memory evictor.
pub const EVICT_POD_BY_NODE_MEMORY_USAGE: &str = "EvictPodByNodeMemoryUsage";
/// Eviction reason used by the CPU evictor.
pub const EVICT_POD_BY_NODE_CPU_USAGE: &str = "EvictPodByNodeCPUUsage";

/// Executes pod evictions against the cluster API.
pub struct PodEvictor {
    kube_client: Arc<dyn EvictionClient>,
    recorder: EventRecorder,
    audit: Arc<dyn AuditSink>,
    pods_evicted: Arc<ExpireCache<String>>,
    metrics: ResManagerMetrics,
    evict_version: EvictVersion,
}

impl PodEvictor {
    pub fn new(
        kube_client: Arc<dyn EvictionClient>,
        recorder: EventRecorder,
        audit: Arc<dyn AuditSink>,
        pods_evicted: Arc<ExpireCache<String>>,
        evict_version: EvictVersion,
    ) -> Self {
        Self {
            kube_client,
            recorder,
            audit,
            pods_evicted,
            metrics: ResManagerMetrics::new(),
            evict_version,
        }
    }

    /// Evict every pod in the batch that has not been evicted recently.
    pub async fn evict_pods_if_not_evicted(
        &self,
        pods: &[Arc<Pod>],
        node: &Node,
        reason: &str,
        message: &str,
    ) {
        for pod in pods {
            self.evict_pod_if_not_evicted(pod, node, reason, message).await;
        }
    }

    /// Evict a single pod unless its UID is still in the evicted set.
    pub async fn evict_pod_if_not_evicted(
        &self,
        pod: &Pod,
        node: &Node,
        reason: &str,
        message: &str,
    ) {
        if self.pods_evicted.get(&pod.metadata.uid).is_some() {
            debug!(
                pod_uid = %pod.metadata.uid,
                reason,
                "Pod has already been evicted recently"
            );
            return;
        }

        if self.evict_pod(pod, node, reason, message).await {
            self.pods_evicted
                .set_default(pod.metadata.uid.clone(), pod.metadata.uid.clone());
        }
    }

    async fn evict_pod(&self, pod: &Pod, node: &Node, reason: &str, message: &str) -> bool {
        let evict_message = format!(
            "evict Pod:{}, reason: {}, message: {}",
            pod.metadata.name, reason, message
        );
        self.audit.record(
            AuditRecord::pod(&pod.metadata.namespace, &pod.metadata.name)
                .reason(reason)
                .message(message),
        );

        let options = DeleteOptions {
            grace_period_seconds: None,
            preconditions: Some(Preconditions::uid(&pod.metadata.uid)),
        };

        match self
            .kube_client
            .evict_pod_by_version(
                &pod.metadata.namespace,
                &pod.metadata.name,
                options,
                self.evict_version,
            )
            .await
        {
            Ok(()) => {
                self.recorder
                    .event(pod, EventType::Warning, EVICT_POD_SUCCESS, &evict_message)
                    .await;
                self.metrics.record_pod_eviction(
                    &pod.metadata.namespace,
                    &pod.metadata.name,
                    reason,
                );
                info!(
                    namespace = %pod.metadata.namespace,
                    pod = %pod.metadata.name,
                    node = %node.metadata.name,
                    reason,
                    "Evicted pod"
                );
                true
            }
            Err(err) => {
                self.recorder
                    .event(pod, EventType::Warning, EVICT_POD_FAIL, &evict_message)
                    .await;
                error!(
                    namespace = %pod.metadata.namespace,
                    pod = %pod.metadata.name,
                    node = %node.metadata.name,
                    reason,
                    error = %err,
                    "Failed to evict pod"
                );
                false
            }
        }
    }
}
