//! Docker-backed container runtime

use crate::convert::{descriptor_from_inspect, lifecycle_event_from_message};
use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as DockerError;
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use dockup_control::{ContainerRuntime, EventStream, RuntimeError};
use dockup_proto::ContainerDescriptor;
use futures::StreamExt;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Request timeout for explicit `unix://` and `tcp://` hosts
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Errors connecting to the Docker daemon
#[derive(Debug, Error)]
pub enum DockerConnectError {
    #[error("Unsupported Docker host: {0}")]
    UnsupportedHost(String),

    #[error("Failed to connect to Docker: {0}")]
    Connect(#[source] DockerError),

    #[error("Docker ping failed: {0}")]
    Ping(#[source] DockerError),
}

/// [`ContainerRuntime`] over the Docker Engine API
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl std::fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerRuntime").finish_non_exhaustive()
    }
}

impl DockerRuntime {
    /// Connect to the daemon and verify it answers
    ///
    /// `host` accepts `unix:///path/to/docker.sock`, `tcp://host:port` or
    /// `http://host:port`. Without a host the platform defaults (honoring
    /// `DOCKER_HOST`) are used.
    pub async fn connect(host: Option<&str>) -> Result<Self, DockerConnectError> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, DEFAULT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, DEFAULT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => return Err(DockerConnectError::UnsupportedHost(host.to_string())),
        }
        .map_err(DockerConnectError::Connect)?;

        docker.ping().await.map_err(DockerConnectError::Ping)?;

        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    /// Wrap a pre-configured client
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_error(container_id: &str, error: DockerError) -> RuntimeError {
    match error {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container_id.to_string()),
        other => RuntimeError::Api(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container_id: &str) -> Result<ContainerDescriptor, RuntimeError> {
        let response = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(container_id, e))?;

        Ok(descriptor_from_inspect(container_id, response))
    }

    async fn running_containers(&self) -> Result<Vec<String>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|container| container.id)
            .collect())
    }

    fn events(&self) -> EventStream {
        let filters = HashMap::from([
            ("type".to_string(), vec!["container".to_string()]),
            (
                "event".to_string(),
                vec!["start".to_string(), "die".to_string()],
            ),
        ]);
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        debug!("Subscribing to Docker container events");
        self.docker
            .events(Some(options))
            .filter_map(|message| async move {
                match message {
                    Ok(message) => lifecycle_event_from_message(message).map(Ok),
                    Err(e) => Some(Err(RuntimeError::Stream(e.to_string()))),
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_not_found() {
        let error = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        };
        assert!(matches!(map_error("abc", error), RuntimeError::NotFound(id) if id == "abc"));
    }

    #[test]
    fn test_server_error_maps_to_api() {
        let error = DockerError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        };
        assert!(matches!(map_error("abc", error), RuntimeError::Api(_)));
    }

    #[tokio::test]
    async fn test_unsupported_host_is_rejected() {
        let result = DockerRuntime::connect(Some("ssh://docker.internal")).await;
        assert!(matches!(result, Err(DockerConnectError::UnsupportedHost(_))));
    }
}
