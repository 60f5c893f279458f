//! Consumed cluster-API eviction interface
//!
//! Evictions go through the cluster API so PodDisruptionBudgets apply;
//! this crate never hard-deletes a pod. The API version is resolved
//! once at manager construction.

use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Eviction API version selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictVersion {
    V1,
    V1Beta1,
}

impl std::fmt::Display for EvictVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictVersion::V1 => write!(f, "v1"),
            EvictVersion::V1Beta1 => write!(f, "v1beta1"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unsupported eviction API version: {0}")]
pub struct UnsupportedVersion(String);

impl FromStr for EvictVersion {
    type Err = UnsupportedVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(EvictVersion::V1),
            "v1beta1" => Ok(EvictVersion::V1Beta1),
            other => Err(UnsupportedVersion(other.to_string())),
        }
    }
}

/// Preconditions the API server checks before acting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preconditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Preconditions {
    /// Require the target to still carry the given UID, so a recreated
    /// pod with the same name is never evicted by mistake.
    pub fn uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
        }
    }
}

/// Options carried by the eviction request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    /// `None` lets the server apply its default grace period.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Preconditions>,
}

/// Narrow eviction surface of the cluster API client.
#[async_trait]
pub trait EvictionClient: Send + Sync {
    async fn evict_pod_by_version(
        &self,
        namespace: &str,
        name: &str,
        options: DeleteOptions,
        version: EvictVersion,
    ) -> Result<()>;
}
