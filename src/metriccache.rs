//! Consumed metric-cache interface and the query adapter
//!
//! The metric cache itself lives outside this crate; reconcilers reach
//! it through [`MetricCache`] and [`Querier`]. The adapter functions
//! below turn `(resource, properties)` pairs into aggregate values and
//! never cache anything themselves.
//!
//! CPU metric values are milli-cores, memory metric values are bytes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::models::Pod;

/// Metric query failure modes.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The property map does not fit the resource.
    #[error("bad query: {0}")]
    BadQuery(String),
    /// The backend cannot answer right now.
    #[error("metric backend unavailable: {0}")]
    Unavailable(String),
}

/// Known metric resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricResource {
    NodeMemoryUsage,
    NodeCpuUsage,
    PodMemUsage,
    PodCpuUsage,
}

impl MetricResource {
    fn is_pod_scoped(&self) -> bool {
        matches!(self, MetricResource::PodMemUsage | MetricResource::PodCpuUsage)
    }

    /// Validate the property map and build a query descriptor.
    ///
    /// Pod-scoped resources require a pod UID property; node-scoped
    /// resources reject any properties.
    pub fn build_query_meta(
        &self,
        properties: HashMap<MetricProperty, String>,
    ) -> Result<QueryMeta, QueryError> {
        if self.is_pod_scoped() {
            if !properties.contains_key(&MetricProperty::PodUid) {
                return Err(QueryError::BadQuery(format!(
                    "resource {self:?} requires a pod UID property"
                )));
            }
        } else if !properties.is_empty() {
            return Err(QueryError::BadQuery(format!(
                "resource {self:?} takes no properties"
            )));
        }

        Ok(QueryMeta {
            resource: *self,
            properties,
        })
    }
}

/// Property keys attached to a metric query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricProperty {
    PodUid,
}

/// A validated query descriptor.
#[derive(Debug, Clone)]
pub struct QueryMeta {
    pub resource: MetricResource,
    pub properties: HashMap<MetricProperty, String>,
}

/// Optional time window for a query; `None` means "whatever the backend
/// considers current".
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Aggregate answer for one query.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub last: Option<f64>,
    pub average: Option<f64>,
    pub count: u64,
}

/// One-shot query handle produced by [`MetricCache::querier`].
#[async_trait]
pub trait Querier: Send + Sync {
    async fn query(
        &self,
        meta: &QueryMeta,
        time_range: Option<TimeRange>,
    ) -> Result<AggregateResult, QueryError>;
}

/// The node-local time-series store, consumed but not owned.
pub trait MetricCache: Send + Sync {
    fn querier(&self) -> Arc<dyn Querier>;
}

/// Run one aggregate query for `(resource, properties)`.
pub async fn do_query(
    querier: &dyn Querier,
    resource: MetricResource,
    properties: HashMap<MetricProperty, String>,
) -> Result<AggregateResult, QueryError> {
    let meta = resource.build_query_meta(properties)?;
    querier.query(&meta, None).await
}

/// Last observed value for a node-scoped metric.
pub async fn collect_node_metric_last(
    querier: &dyn Querier,
    meta: &QueryMeta,
) -> Result<f64, QueryError> {
    let result = querier.query(meta, None).await?;
    result
        .last
        .ok_or_else(|| QueryError::Unavailable(format!("no samples for {:?}", meta.resource)))
}

/// Last observed value of a pod-scoped metric for every given pod.
///
/// Pods whose query fails or has no samples are simply absent from the
/// returned map; callers treat absence as "no sample".
pub async fn collect_all_pod_metrics_last(
    metric_cache: &dyn MetricCache,
    pods: &[Arc<Pod>],
    resource: MetricResource,
) -> HashMap<String, f64> {
    let querier = metric_cache.querier();
    let mut values = HashMap::new();

    for pod in pods {
        let uid = pod.metadata.uid.clone();
        let properties = HashMap::from([(MetricProperty::PodUid, uid.clone())]);
        match do_query(querier.as_ref(), resource, properties).await {
            Ok(result) => {
                if let Some(last) = result.last {
                    values.insert(uid, last);
                }
            }
            Err(err) => {
                debug!(
                    pod = %pod.metadata.name,
                    resource = ?resource,
                    error = %err,
                    "Failed to collect pod metric"
                );
            }
        }
    }

    values
}
