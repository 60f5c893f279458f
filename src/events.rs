//! Kubernetes event model and the event recorder
//!
//! The recorder formats events against the affected pod and hands them
//! to an injected [`EventSink`]; there is no process-wide broadcaster.
//! Delivery is fire-and-forget, the sink owns retries if it wants any.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Pod;

/// Event type (Normal or Warning)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// Kubernetes event emitted against a pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesEvent {
    /// API version for the event
    pub api_version: String,
    /// Kind is always "Event"
    pub kind: String,
    /// Event metadata
    pub metadata: EventMetadata,
    /// Reference to the affected object
    pub involved_object: ObjectReference,
    /// Reason for the event
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// Event type (Normal or Warning)
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// First timestamp
    pub first_timestamp: String,
    /// Last timestamp
    pub last_timestamp: String,
    /// Event count
    pub count: u32,
    /// Source of the event
    pub source: EventSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

impl ObjectReference {
    pub fn for_pod(pod: &Pod) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            name: pod.metadata.name.clone(),
            namespace: pod.metadata.namespace.clone(),
            uid: Some(pod.metadata.uid.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    pub component: String,
    pub host: Option<String>,
}

/// Where finished events go. Owned by the host, injected everywhere.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: KubernetesEvent);
}

/// Builds events with a fixed source and forwards them to the sink.
#[derive(Clone)]
pub struct EventRecorder {
    component: String,
    host: String,
    sink: Arc<dyn EventSink>,
}

impl EventRecorder {
    pub fn new(sink: Arc<dyn EventSink>, component: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            host: host.into(),
            sink,
        }
    }

    /// Emit an event against the given pod.
    pub async fn event(&self, pod: &Pod, event_type: EventType, reason: &str, message: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let event = KubernetesEvent {
            api_version: "v1".to_string(),
            kind: "Event".to_string(),
            metadata: EventMetadata {
                name: format!("{}.{}", pod.metadata.name, event_name_suffix()),
                namespace: pod.metadata.namespace.clone(),
            },
            involved_object: ObjectReference::for_pod(pod),
            reason: reason.to_string(),
            message: message.to_string(),
            event_type,
            first_timestamp: timestamp.clone(),
            last_timestamp: timestamp,
            count: 1,
            source: EventSource {
                component: self.component.clone(),
                host: Some(self.host.clone()),
            },
        };

        self.sink.emit(event).await;
    }
}

/// Generate a unique-enough suffix for event naming
fn event_name_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}{:x}", now.as_secs(), now.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectMeta;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<KubernetesEvent>>,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: KubernetesEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn test_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: "test-pod".to_string(),
                namespace: "default".to_string(),
                uid: "uid-123".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_recorder_builds_event_for_pod() {
        let sink = Arc::new(CollectingSink::default());
        let recorder = EventRecorder::new(sink.clone(), "resmanager", "node-1");

        recorder
            .event(&test_pod(), EventType::Warning, "evictPodSuccess", "evicted")
            .await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.reason, "evictPodSuccess");
        assert_eq!(event.event_type, EventType::Warning);
        assert_eq!(event.involved_object.name, "test-pod");
        assert_eq!(event.involved_object.uid.as_deref(), Some("uid-123"));
        assert_eq!(event.source.component, "resmanager");
        assert_eq!(event.source.host.as_deref(), Some("node-1"));
        assert!(event.metadata.name.starts_with("test-pod."));
    }
}
