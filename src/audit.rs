//! Audit records for eviction decisions
//!
//! One record per eviction attempt, written before the API call so the
//! decision survives even when the call fails.

use tracing::info;

/// A single audit entry keyed by `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub level: u8,
    pub namespace: String,
    pub name: String,
    pub reason: String,
    pub message: String,
}

impl AuditRecord {
    /// Start a level-0 record for a pod.
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            level: 0,
            namespace: namespace.into(),
            name: name.into(),
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Destination for audit records; internally synchronized.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Default sink that writes records to the structured log.
#[derive(Debug, Default, Clone)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "audit",
            level = record.level,
            namespace = %record.namespace,
            pod = %record.name,
            reason = %record.reason,
            message = %record.message,
            "Pod eviction audited"
        );
    }
}
