//! QoS grey-control extension plugins
//!
//! Side plugins started once by the host before the reconcilers. The
//! extension configuration is opaque to the core; each plugin decides
//! what to read from it. A plugin that fails to start is logged and
//! skipped, never blocking the manager.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Opaque configuration handed to every plugin at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QosExtensionConfig {
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// A grey-control extension hosted next to the reconcilers.
///
/// `start` spawns whatever background work the plugin needs and
/// returns; long-running work must watch the shutdown receiver.
#[async_trait]
pub trait QosExtensionPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn start(
        &self,
        config: &QosExtensionConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;
}

/// Plugins registered with the host, started in registration order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn QosExtensionPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn QosExtensionPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Start every plugin; failures are logged and skipped.
    pub async fn start_all(
        &self,
        config: &QosExtensionConfig,
        shutdown: &broadcast::Sender<()>,
    ) {
        for plugin in &self.plugins {
            match plugin.start(config, shutdown.subscribe()).await {
                Ok(()) => info!(plugin = plugin.name(), "Started QoS extension plugin"),
                Err(err) => {
                    error!(
                        plugin = plugin.name(),
                        error = %err,
                        "Failed to start QoS extension plugin"
                    );
                }
            }
        }
    }
}
