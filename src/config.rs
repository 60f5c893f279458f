//! Resource manager configuration

use anyhow::Result;
use serde::Deserialize;

use crate::plugins::QosExtensionConfig;

/// Configuration for the reconcile host and its controllers.
#[derive(Debug, Clone, Deserialize)]
pub struct ResManagerConfig {
    /// Tick period for non-eviction reconcilers in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,

    /// Tick period for the CPU suppress reconciler in seconds
    #[serde(default = "default_cpu_suppress_interval")]
    pub cpu_suppress_interval_seconds: u64,

    /// Tick period for the CPU evictor in seconds
    #[serde(default = "default_cpu_evict_interval")]
    pub cpu_evict_interval_seconds: u64,

    /// Tick period for the memory evictor in seconds
    #[serde(default = "default_memory_evict_interval")]
    pub memory_evict_interval_seconds: u64,

    /// Minimum gap between two memory eviction waves in seconds
    #[serde(default = "default_memory_evict_cool_time")]
    pub memory_evict_cool_time_seconds: u64,

    /// Minimum gap between two CPU eviction waves in seconds
    #[serde(default = "default_cpu_evict_cool_time")]
    pub cpu_evict_cool_time_seconds: u64,

    /// Resource usage collection interval; any value below 1 disables
    /// the whole manager
    #[serde(default = "default_collect_res_used_interval")]
    pub collect_res_used_interval_seconds: i64,

    /// How long to wait for the states informer's initial sync before
    /// giving up, in seconds
    #[serde(default = "default_states_sync_timeout")]
    pub states_sync_timeout_seconds: u64,

    /// Opaque configuration for QoS grey-control extension plugins
    #[serde(default)]
    pub qos_extension_cfg: QosExtensionConfig,
}

fn default_reconcile_interval() -> u64 {
    15
}

fn default_cpu_suppress_interval() -> u64 {
    1
}

fn default_cpu_evict_interval() -> u64 {
    1
}

fn default_memory_evict_interval() -> u64 {
    1
}

fn default_memory_evict_cool_time() -> u64 {
    4
}

fn default_cpu_evict_cool_time() -> u64 {
    20
}

fn default_collect_res_used_interval() -> i64 {
    1
}

fn default_states_sync_timeout() -> u64 {
    120
}

impl Default for ResManagerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_seconds: default_reconcile_interval(),
            cpu_suppress_interval_seconds: default_cpu_suppress_interval(),
            cpu_evict_interval_seconds: default_cpu_evict_interval(),
            memory_evict_interval_seconds: default_memory_evict_interval(),
            memory_evict_cool_time_seconds: default_memory_evict_cool_time(),
            cpu_evict_cool_time_seconds: default_cpu_evict_cool_time(),
            collect_res_used_interval_seconds: default_collect_res_used_interval(),
            states_sync_timeout_seconds: default_states_sync_timeout(),
            qos_extension_cfg: QosExtensionConfig::default(),
        }
    }
}

impl ResManagerConfig {
    /// Load configuration from the environment (prefix `RESMANAGER_`),
    /// falling back to defaults for anything unset.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("RESMANAGER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
