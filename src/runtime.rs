//! Consumed container-runtime interface and the container killer
//!
//! Runtime handlers are registered per runtime type (`containerd`,
//! `docker`, ...) and looked up from the `<runtime>://<id>` prefix of a
//! container ID. Stopping containers is strictly best-effort; the
//! killer logs failures and never propagates them.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::Pod;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown container runtime: {0}")]
    UnknownRuntime(String),
    #[error("malformed container id: {0}")]
    MalformedContainerId(String),
}

/// Low-level handle into one container runtime.
#[async_trait]
pub trait RuntimeHandler: Send + Sync {
    async fn stop_container(&self, container_id: &str, grace_seconds: i64) -> Result<()>;
}

/// Registry of runtime handlers, owned by the host and shared with the
/// reconcilers.
#[derive(Default)]
pub struct RuntimeRegistry {
    handlers: DashMap<String, Arc<dyn RuntimeHandler>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, runtime_type: impl Into<String>, handler: Arc<dyn RuntimeHandler>) {
        self.handlers.insert(runtime_type.into(), handler);
    }

    pub fn get_runtime_handler(
        &self,
        runtime_type: &str,
    ) -> Result<Arc<dyn RuntimeHandler>, RuntimeError> {
        self.handlers
            .get(runtime_type)
            .map(|h| h.clone())
            .ok_or_else(|| RuntimeError::UnknownRuntime(runtime_type.to_string()))
    }
}

/// Split `<runtime>://<id>` into its parts.
pub fn parse_container_id(container_id: &str) -> Result<(String, String), RuntimeError> {
    match container_id.split_once("://") {
        Some((runtime, id)) if !runtime.is_empty() && !id.is_empty() => {
            Ok((runtime.to_string(), id.to_string()))
        }
        _ => Err(RuntimeError::MalformedContainerId(
            container_id.to_string(),
        )),
    }
}

/// Best-effort stop of every running container in the pod.
///
/// A spec container with no status entry, or one that is not running,
/// aborts the remaining containers of this pod; an unknown or
/// malformed runtime only skips the affected container. Stop errors
/// are logged and ignored.
pub async fn kill_containers(registry: &RuntimeRegistry, pod: &Pod, message: &str) {
    for container in &pod.spec.containers {
        let Some(status) = pod.find_container_status(&container.name) else {
            error!(
                pod = %pod.metadata.name,
                namespace = %pod.metadata.namespace,
                container = %container.name,
                "Failed to find container status"
            );
            return;
        };

        if !status.running {
            return;
        }

        if status.container_id.is_empty() {
            warn!(
                pod = %pod.metadata.name,
                namespace = %pod.metadata.namespace,
                container = %container.name,
                %message,
                "Container has no runtime ID yet"
            );
            continue;
        }

        let (runtime_type, container_id) = match parse_container_id(&status.container_id) {
            Ok(parts) => parts,
            Err(err) => {
                error!(
                    container_id = %status.container_id,
                    error = %err,
                    %message,
                    "Failed to parse container id"
                );
                continue;
            }
        };

        let handler = match registry.get_runtime_handler(&runtime_type) {
            Ok(handler) => handler,
            Err(err) => {
                error!(
                    container_id = %status.container_id,
                    error = %err,
                    %message,
                    "Failed to resolve runtime handler"
                );
                continue;
            }
        };

        if let Err(err) = handler.stop_container(&container_id, 0).await {
            error!(
                container_id = %container_id,
                error = %err,
                %message,
                "Failed to stop container"
            );
        }
    }
}
