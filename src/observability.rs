//! Prometheus metrics for the resource manager
//!
//! Metrics are registered once in the process-global registry; the
//! public handle is a cheap clonable marker.

use prometheus::{register_int_counter_vec, IntCounterVec};
use std::sync::OnceLock;

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ResManagerMetricsInner> = OnceLock::new();

struct ResManagerMetricsInner {
    pod_eviction_total: IntCounterVec,
    reconcile_ticks_total: IntCounterVec,
}

impl ResManagerMetricsInner {
    fn new() -> Self {
        Self {
            pod_eviction_total: register_int_counter_vec!(
                "pod_eviction_total",
                "Number of successful pod evictions issued by this node",
                &["namespace", "name", "reason"]
            )
            .expect("Failed to register pod_eviction_total"),

            reconcile_ticks_total: register_int_counter_vec!(
                "resmanager_reconcile_ticks_total",
                "Number of reconcile ticks executed per reconciler",
                &["reconciler"]
            )
            .expect("Failed to register reconcile_ticks_total"),
        }
    }
}

/// Handle to the resource-manager metrics.
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ResManagerMetrics {
    _private: (),
}

impl Default for ResManagerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ResManagerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ResManagerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ResManagerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Count one successful eviction call.
    pub fn record_pod_eviction(&self, namespace: &str, name: &str, reason: &str) {
        self.inner()
            .pod_eviction_total
            .with_label_values(&[namespace, name, reason])
            .inc();
    }

    /// Count one executed reconcile tick.
    pub fn record_reconcile_tick(&self, reconciler: &str) {
        self.inner()
            .reconcile_ticks_total
            .with_label_values(&[reconciler])
            .inc();
    }

    /// Current value of the eviction counter for a label set, for tests
    /// and exposition checks.
    pub fn pod_eviction_count(&self, namespace: &str, name: &str, reason: &str) -> u64 {
        self.inner()
            .pod_eviction_total
            .with_label_values(&[namespace, name, reason])
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_eviction_counter() {
        let metrics = ResManagerMetrics::new();
        let before = metrics.pod_eviction_count("default", "pod-a", "TestReason");

        metrics.record_pod_eviction("default", "pod-a", "TestReason");
        metrics.record_pod_eviction("default", "pod-a", "TestReason");

        assert_eq!(
            metrics.pod_eviction_count("default", "pod-a", "TestReason"),
            before + 2
        );
    }

    #[test]
    fn test_reconcile_tick_counter() {
        let metrics = ResManagerMetrics::new();
        metrics.record_reconcile_tick("memory-evict");
    }
}
