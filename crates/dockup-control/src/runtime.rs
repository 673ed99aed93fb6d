//! Container runtime seam

use async_trait::async_trait;
use dockup_proto::{ContainerDescriptor, LifecycleEvent};
use futures::stream::BoxStream;
use thiserror::Error;

/// Container runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Container runtime error: {0}")]
    Api(String),

    #[error("Event stream error: {0}")]
    Stream(String),
}

/// Stream of lifecycle events from the runtime
pub type EventStream = BoxStream<'static, Result<LifecycleEvent, RuntimeError>>;

/// What the controller needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Inspect one container
    async fn inspect(&self, container_id: &str) -> Result<ContainerDescriptor, RuntimeError>;

    /// IDs of currently running containers
    async fn running_containers(&self) -> Result<Vec<String>, RuntimeError>;

    /// Subscribe to container lifecycle events
    fn events(&self) -> EventStream;
}
