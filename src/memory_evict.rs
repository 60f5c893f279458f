//! BE memory eviction controller
//!
//! Watches node memory usage against the SLO thresholds and, under
//! pressure, kills and evicts best-effort pods until enough memory is
//! released to fall back to the lower bound. Containers are stopped
//! before the API eviction so memory is freed even when the eviction
//! call is rejected.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::evict::EVICT_POD_BY_NODE_MEMORY_USAGE;
use crate::features::{be_feature_disabled, Feature};
use crate::manager::NodeContext;
use crate::metriccache::{collect_all_pod_metrics_last, collect_node_metric_last, MetricResource};
use crate::models::{Node, Pod, QoSClass, ResourceThresholdStrategy};
use crate::runner::Reconciler;
use crate::runtime::kill_containers;

/// Lower bound applied when the SLO sets no explicit lower percent.
const MEMORY_RELEASE_BUFFER_PERCENT: i64 = 2;

/// Transient `(pod, memory used)` pair used for victim ranking.
/// `usage == 0` means "no sample".
#[derive(Debug, Clone)]
pub(crate) struct PodInfo {
    pub pod: Arc<Pod>,
    pub usage: f64,
}

pub struct MemoryEvictor {
    context: Arc<NodeContext>,
    interval: Duration,
    cooldown: Duration,
    last_evict_time: Mutex<Instant>,
}

impl MemoryEvictor {
    pub fn new(context: Arc<NodeContext>) -> Self {
        let interval = Duration::from_secs(context.config.memory_evict_interval_seconds);
        let cooldown = Duration::from_secs(context.config.memory_evict_cool_time_seconds);
        Self {
            context,
            interval,
            cooldown,
            last_evict_time: Mutex::new(Instant::now()),
        }
    }

    async fn memory_evict(&self) {
        debug!("Starting memory evict pass");

        let last_evict = *self.last_evict_time.lock().unwrap();
        if Instant::now() < last_evict + self.cooldown {
            debug!("Skipping memory evict, still in cooldown");
            return;
        }

        let node_slo = self.context.states_informer.get_node_slo();
        match be_feature_disabled(node_slo.as_deref(), Feature::BEMemoryEvict) {
            Err(err) => {
                error!(error = %err, "Failed to read memory eviction feature gate");
                return;
            }
            Ok(true) => {
                debug!("Skipping memory evict, disabled in node SLO");
                return;
            }
            Ok(false) => {}
        }
        // The gate check guarantees the strategy is present.
        let node_slo = node_slo.unwrap();
        let Some(threshold_config) = node_slo.spec.resource_used_threshold_with_be.as_ref()
        else {
            return;
        };

        let Some(threshold_percent) = threshold_config.memory_evict_threshold_percent else {
            warn!("Skipping memory evict, threshold percent is unset");
            return;
        };
        if threshold_percent < 0 {
            warn!(threshold_percent, "Skipping memory evict, threshold percent is negative");
            return;
        }

        let lower_percent = memory_evict_lower_percent(threshold_config, threshold_percent);
        if lower_percent >= threshold_percent {
            warn!(
                lower_percent,
                threshold_percent,
                "Skipping memory evict, lower percent must be below threshold percent"
            );
            return;
        }

        let pods = self.context.states_informer.get_all_pods();
        let pod_metrics = collect_all_pod_metrics_last(
            self.context.metric_cache.as_ref(),
            &pods,
            MetricResource::PodMemUsage,
        )
        .await;

        let Some(node) = self.context.states_informer.get_node() else {
            warn!(node = %self.context.node_name, "Skipping memory evict, node is unknown");
            return;
        };

        let memory_capacity = node.status.capacity.memory_bytes;
        if memory_capacity <= 0 {
            warn!(
                memory_capacity,
                "Skipping memory evict, memory capacity must be positive"
            );
            return;
        }

        let query_meta = match MetricResource::NodeMemoryUsage.build_query_meta(HashMap::new()) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(error = %err, "Skipping memory evict, node query build failed");
                return;
            }
        };
        let querier = self.context.metric_cache.querier();
        let node_memory_used = match collect_node_metric_last(querier.as_ref(), &query_meta).await
        {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Skipping memory evict, node metric query failed");
                return;
            }
        };

        let node_memory_usage = (node_memory_used as i64) * 100 / memory_capacity;
        if node_memory_usage < threshold_percent {
            debug!(
                node_memory_usage,
                threshold_percent,
                "Skipping memory evict, node memory usage below threshold"
            );
            return;
        }

        info!(
            node = %self.context.node_name,
            memory_used = node_memory_used,
            usage_percent = node_memory_usage,
            threshold_percent,
            lower_percent,
            "Node memory usage above eviction threshold"
        );

        let memory_need_release = memory_capacity * (node_memory_usage - lower_percent) / 100;
        self.kill_and_evict_be_pods(&node, &pods, &pod_metrics, memory_need_release)
            .await;

        debug!("Memory evict pass completed");
    }

    async fn kill_and_evict_be_pods(
        &self,
        node: &Node,
        pods: &[Arc<Pod>],
        pod_metrics: &HashMap<String, f64>,
        memory_need_release: i64,
    ) {
        let be_pod_infos = sorted_be_pod_infos(pods, pod_metrics);
        let message = format!(
            "killAndEvictBEPods for node({}), need to release memory: {}",
            self.context.node_name, memory_need_release
        );

        // Released bytes are tallied from the samples taken before the
        // kill; usage is never re-measured inside the drain loop.
        let mut memory_released: i64 = 0;
        let mut killed_pods: Vec<Arc<Pod>> = Vec::new();
        for be_pod in &be_pod_infos {
            if memory_released >= memory_need_release {
                break;
            }

            let kill_message = format!("{}, kill pod: {}", message, be_pod.pod.metadata.name);
            kill_containers(&self.context.runtime_registry, &be_pod.pod, &kill_message).await;
            killed_pods.push(be_pod.pod.clone());
            if be_pod.usage != 0.0 {
                memory_released += be_pod.usage as i64;
            }
        }

        self.context
            .evictor
            .evict_pods_if_not_evicted(
                &killed_pods,
                node,
                EVICT_POD_BY_NODE_MEMORY_USAGE,
                &message,
            )
            .await;

        *self.last_evict_time.lock().unwrap() = Instant::now();
        info!(
            need_release = memory_need_release,
            released = memory_released,
            killed = killed_pods.len(),
            "Kill and evict of BE pods completed"
        );
    }
}

#[async_trait]
impl Reconciler for MemoryEvictor {
    fn name(&self) -> &str {
        "memory-evict"
    }

    fn gates(&self) -> &[Feature] {
        &[Feature::BEMemoryEvict]
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) {
        self.memory_evict().await;
    }
}

fn memory_evict_lower_percent(
    config: &ResourceThresholdStrategy,
    threshold_percent: i64,
) -> i64 {
    config
        .memory_evict_lower_percent
        .unwrap_or(threshold_percent - MEMORY_RELEASE_BUFFER_PERCENT)
}

/// BE pods ranked by eviction preference, first victim first:
/// lower priority first, then higher memory usage, then (when neither
/// pod has a sample) name descending. A pod with a sample ranks before
/// one without.
pub(crate) fn sorted_be_pod_infos(
    pods: &[Arc<Pod>],
    pod_metrics: &HashMap<String, f64>,
) -> Vec<PodInfo> {
    let mut infos: Vec<PodInfo> = pods
        .iter()
        .filter(|pod| pod.qos_class() == QoSClass::BE)
        .map(|pod| PodInfo {
            pod: pod.clone(),
            usage: pod_metrics.get(&pod.metadata.uid).copied().unwrap_or(0.0),
        })
        .collect();

    infos.sort_by(compare_pod_infos);
    infos
}

fn compare_pod_infos(a: &PodInfo, b: &PodInfo) -> Ordering {
    if let (Some(pa), Some(pb)) = (a.pod.spec.priority, b.pod.spec.priority) {
        if pa != pb {
            return pa.cmp(&pb);
        }
    }
    if a.usage != 0.0 && b.usage != 0.0 {
        return b
            .usage
            .partial_cmp(&a.usage)
            .unwrap_or(Ordering::Equal);
    }
    if a.usage == 0.0 && b.usage == 0.0 {
        return b.pod.metadata.name.cmp(&a.pod.metadata.name);
    }
    // Exactly one pod has a sample; it goes first.
    if b.usage == 0.0 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}
