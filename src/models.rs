//! Core data models for the resource manager
//!
//! Pod, Node and NodeSLO snapshots as served by the states informer.
//! All types are immutable values; the informer hands out fresh copies
//! so readers never need a lock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label carrying the QoS class of a pod.
pub const QOS_CLASS_LABEL: &str = "koordinator.sh/qosClass";

/// QoS class parsed from the pod label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QoSClass {
    /// Latency-sensitive with reserved cores
    LSR,
    /// Latency-sensitive
    LS,
    /// Best-effort, reclaimable under pressure
    BE,
    /// Node system components
    System,
    /// No QoS label present
    None,
}

impl QoSClass {
    pub fn from_label(value: &str) -> Self {
        match value {
            "LSR" => QoSClass::LSR,
            "LS" => QoSClass::LS,
            "BE" => QoSClass::BE,
            "SYSTEM" => QoSClass::System,
            _ => QoSClass::None,
        }
    }
}

/// Object metadata shared by pods and nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Stable opaque identifier; survives nothing, a recreated object
    /// with the same name gets a fresh UID.
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Container as declared in the pod spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
}

/// Observed container state reported in the pod status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    /// Formatted as `<runtime>://<id>`; empty until the runtime reports it.
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    /// Scheduling priority; higher values are evicted later.
    #[serde(default)]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

/// Pod snapshot from the states informer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    /// QoS class from the pod label; `QoSClass::None` when unlabeled.
    pub fn qos_class(&self) -> QoSClass {
        self.metadata
            .labels
            .get(QOS_CLASS_LABEL)
            .map(|v| QoSClass::from_label(v))
            .unwrap_or(QoSClass::None)
    }

    /// Find the status entry matching a spec container by name.
    pub fn find_container_status(&self, container_name: &str) -> Option<&ContainerStatus> {
        self.status
            .container_statuses
            .iter()
            .find(|s| s.name == container_name)
    }
}

/// Allocatable capacity of the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    /// Memory capacity in bytes
    #[serde(default)]
    pub memory_bytes: i64,
    /// CPU capacity in milli-cores
    #[serde(default)]
    pub cpu_milli: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub capacity: ResourceCapacity,
}

/// Node snapshot from the states informer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
}

/// Best-effort resource threshold policy from the node SLO.
///
/// A missing `enable` means the whole strategy is disabled. Threshold
/// and lower percentages are validated by the consuming reconciler:
/// `lower < threshold` must hold when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceThresholdStrategy {
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub memory_evict_threshold_percent: Option<i64>,
    #[serde(default)]
    pub memory_evict_lower_percent: Option<i64>,
    #[serde(default)]
    pub cpu_evict_threshold_percent: Option<i64>,
    #[serde(default)]
    pub cpu_evict_lower_percent: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSLOSpec {
    #[serde(default)]
    pub resource_used_threshold_with_be: Option<ResourceThresholdStrategy>,
}

/// Per-node SLO policy object. Immutable snapshot; the informer returns
/// a fresh copy on every read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSLO {
    pub spec: NodeSLOSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled_pod(qos: &str) -> Pod {
        let mut labels = HashMap::new();
        labels.insert(QOS_CLASS_LABEL.to_string(), qos.to_string());
        Pod {
            metadata: ObjectMeta {
                name: "pod-a".to_string(),
                namespace: "default".to_string(),
                uid: "uid-a".to_string(),
                labels,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_qos_class_from_label() {
        assert_eq!(labeled_pod("BE").qos_class(), QoSClass::BE);
        assert_eq!(labeled_pod("LS").qos_class(), QoSClass::LS);
        assert_eq!(labeled_pod("LSR").qos_class(), QoSClass::LSR);
        assert_eq!(labeled_pod("SYSTEM").qos_class(), QoSClass::System);
        assert_eq!(labeled_pod("bogus").qos_class(), QoSClass::None);
    }

    #[test]
    fn test_qos_class_unlabeled() {
        let pod = Pod::default();
        assert_eq!(pod.qos_class(), QoSClass::None);
    }

    #[test]
    fn test_find_container_status() {
        let pod = Pod {
            status: PodStatus {
                container_statuses: vec![ContainerStatus {
                    name: "main".to_string(),
                    container_id: "containerd://abc".to_string(),
                    running: true,
                }],
            },
            ..Default::default()
        };

        assert!(pod.find_container_status("main").is_some());
        assert!(pod.find_container_status("sidecar").is_none());
    }
}
