//! BE CPU eviction controller
//!
//! Same envelope as the memory evictor, keyed on the CPU fields of the
//! SLO threshold strategy: when node CPU usage stays above the
//! threshold, best-effort pods are killed and evicted until enough
//! milli-cores are reclaimed to reach the lower bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::evict::EVICT_POD_BY_NODE_CPU_USAGE;
use crate::features::{be_feature_disabled, Feature};
use crate::manager::NodeContext;
use crate::memory_evict::sorted_be_pod_infos;
use crate::metriccache::{collect_all_pod_metrics_last, collect_node_metric_last, MetricResource};
use crate::models::{Node, Pod};
use crate::runner::Reconciler;
use crate::runtime::kill_containers;

const CPU_RELEASE_BUFFER_PERCENT: i64 = 2;

pub struct CpuEvictor {
    context: Arc<NodeContext>,
    interval: Duration,
    cooldown: Duration,
    last_evict_time: Mutex<Instant>,
}

impl CpuEvictor {
    pub fn new(context: Arc<NodeContext>) -> Self {
        let interval = Duration::from_secs(context.config.cpu_evict_interval_seconds);
        let cooldown = Duration::from_secs(context.config.cpu_evict_cool_time_seconds);
        Self {
            context,
            interval,
            cooldown,
            last_evict_time: Mutex::new(Instant::now()),
        }
    }

    async fn cpu_evict(&self) {
        debug!("Starting cpu evict pass");

        let last_evict = *self.last_evict_time.lock().unwrap();
        if Instant::now() < last_evict + self.cooldown {
            debug!("Skipping cpu evict, still in cooldown");
            return;
        }

        let node_slo = self.context.states_informer.get_node_slo();
        match be_feature_disabled(node_slo.as_deref(), Feature::BECPUEvict) {
            Err(err) => {
                error!(error = %err, "Failed to read cpu eviction feature gate");
                return;
            }
            Ok(true) => {
                debug!("Skipping cpu evict, disabled in node SLO");
                return;
            }
            Ok(false) => {}
        }
        let node_slo = node_slo.unwrap();
        let Some(threshold_config) = node_slo.spec.resource_used_threshold_with_be.as_ref()
        else {
            return;
        };

        let Some(threshold_percent) = threshold_config.cpu_evict_threshold_percent else {
            warn!("Skipping cpu evict, threshold percent is unset");
            return;
        };
        if threshold_percent < 0 {
            warn!(threshold_percent, "Skipping cpu evict, threshold percent is negative");
            return;
        }

        let lower_percent = threshold_config
            .cpu_evict_lower_percent
            .unwrap_or(threshold_percent - CPU_RELEASE_BUFFER_PERCENT);
        if lower_percent >= threshold_percent {
            warn!(
                lower_percent,
                threshold_percent,
                "Skipping cpu evict, lower percent must be below threshold percent"
            );
            return;
        }

        let pods = self.context.states_informer.get_all_pods();
        let pod_metrics = collect_all_pod_metrics_last(
            self.context.metric_cache.as_ref(),
            &pods,
            MetricResource::PodCpuUsage,
        )
        .await;

        let Some(node) = self.context.states_informer.get_node() else {
            warn!(node = %self.context.node_name, "Skipping cpu evict, node is unknown");
            return;
        };

        let cpu_capacity = node.status.capacity.cpu_milli;
        if cpu_capacity <= 0 {
            warn!(cpu_capacity, "Skipping cpu evict, cpu capacity must be positive");
            return;
        }

        let query_meta = match MetricResource::NodeCpuUsage.build_query_meta(HashMap::new()) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(error = %err, "Skipping cpu evict, node query build failed");
                return;
            }
        };
        let querier = self.context.metric_cache.querier();
        let node_cpu_used = match collect_node_metric_last(querier.as_ref(), &query_meta).await {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Skipping cpu evict, node metric query failed");
                return;
            }
        };

        let node_cpu_usage = (node_cpu_used as i64) * 100 / cpu_capacity;
        if node_cpu_usage < threshold_percent {
            debug!(
                node_cpu_usage,
                threshold_percent,
                "Skipping cpu evict, node cpu usage below threshold"
            );
            return;
        }

        info!(
            node = %self.context.node_name,
            cpu_used_milli = node_cpu_used,
            usage_percent = node_cpu_usage,
            threshold_percent,
            lower_percent,
            "Node cpu usage above eviction threshold"
        );

        let cpu_need_release = cpu_capacity * (node_cpu_usage - lower_percent) / 100;
        self.kill_and_evict_be_pods(&node, &pods, &pod_metrics, cpu_need_release)
            .await;

        debug!("Cpu evict pass completed");
    }

    async fn kill_and_evict_be_pods(
        &self,
        node: &Node,
        pods: &[Arc<Pod>],
        pod_metrics: &HashMap<String, f64>,
        cpu_need_release: i64,
    ) {
        let be_pod_infos = sorted_be_pod_infos(pods, pod_metrics);
        let message = format!(
            "killAndEvictBEPods for node({}), need to release cpu: {}m",
            self.context.node_name, cpu_need_release
        );

        let mut cpu_released: i64 = 0;
        let mut killed_pods = Vec::new();
        for be_pod in &be_pod_infos {
            if cpu_released >= cpu_need_release {
                break;
            }

            let kill_message = format!("{}, kill pod: {}", message, be_pod.pod.metadata.name);
            kill_containers(&self.context.runtime_registry, &be_pod.pod, &kill_message).await;
            killed_pods.push(be_pod.pod.clone());
            if be_pod.usage != 0.0 {
                cpu_released += be_pod.usage as i64;
            }
        }

        self.context
            .evictor
            .evict_pods_if_not_evicted(&killed_pods, node, EVICT_POD_BY_NODE_CPU_USAGE, &message)
            .await;

        *self.last_evict_time.lock().unwrap() = Instant::now();
        info!(
            need_release_milli = cpu_need_release,
            released_milli = cpu_released,
            killed = killed_pods.len(),
            "Kill and evict of BE pods completed"
        );
    }
}

#[async_trait]
impl Reconciler for CpuEvictor {
    fn name(&self) -> &str {
        "cpu-evict"
    }

    fn gates(&self) -> &[Feature] {
        &[Feature::BECPUEvict]
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self) {
        self.cpu_evict().await;
    }
}
