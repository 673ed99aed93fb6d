//! Lifecycle event handling
//!
//! A `start` for a labeled container resolves its address and certificate,
//! creates and starts a tunnel, and registers it under the container's
//! hostname. A `die` looks the hostname up again, stops the registered
//! tunnel and drops it from the registry.

use crate::certificate::{CertificateError, CertificateResolver};
use crate::metadata::ContainerMetadata;
use crate::registry::{RegistryError, TunnelRegistry};
use crate::resolver::{HostnameResolver, ResolveError};
use crate::runtime::{ContainerRuntime, RuntimeError};
use dockup_proto::{
    short_id, ContainerDescriptor, EventStatus, LabelSchema, LifecycleEvent, TunnelConfig,
    DEFAULT_PROTOCOL,
};
use dockup_transport::{TransportError, TunnelTransport};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Errors from handling one container
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to inspect container {container_id}: {source}")]
    Inspection {
        container_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Unable to connect to {container_id}: {source}")]
    Resolution {
        container_id: String,
        #[source]
        source: ResolveError,
    },

    #[error("{0}")]
    Certificate(#[from] CertificateError),

    #[error("{0}")]
    TunnelNotFound(#[from] RegistryError),

    #[error("Tunnel operation failed for {hostname}: {source}")]
    TunnelOperation {
        hostname: String,
        #[source]
        source: TransportError,
    },

    #[error("Handling container {container_id} timed out after {after:?}")]
    Timeout {
        container_id: String,
        after: Duration,
    },
}

/// Drives tunnels from container lifecycle events
pub struct TunnelController {
    runtime: Arc<dyn ContainerRuntime>,
    transport: Arc<dyn TunnelTransport>,
    registry: Arc<TunnelRegistry>,
    hostname_resolver: HostnameResolver,
    certificate_resolver: CertificateResolver,
    labels: LabelSchema,
    event_timeout: Option<Duration>,
}

impl TunnelController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        transport: Arc<dyn TunnelTransport>,
        registry: Arc<TunnelRegistry>,
        hostname_resolver: HostnameResolver,
        certificate_resolver: CertificateResolver,
    ) -> Self {
        Self {
            runtime,
            transport,
            registry,
            hostname_resolver,
            certificate_resolver,
            labels: LabelSchema::default(),
            event_timeout: None,
        }
    }

    /// Read routing labels under a different prefix
    pub fn with_labels(mut self, labels: LabelSchema) -> Self {
        self.labels = labels;
        self
    }

    /// Bound the time spent on a single event
    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<TunnelRegistry> {
        &self.registry
    }

    pub fn labels(&self) -> &LabelSchema {
        &self.labels
    }

    /// Handle one lifecycle event
    ///
    /// Failures are logged, never returned; the caller keeps consuming
    /// events regardless of how this one went.
    pub async fn handle_event(&self, event: LifecycleEvent) {
        let container_id = event.container_id.as_str();

        match &event.status {
            EventStatus::Start => {
                if let Err(e) = self
                    .bounded(container_id, self.handle_start(container_id))
                    .await
                {
                    error!(
                        "Failed to handle start of container {}: {}",
                        short_id(container_id),
                        e
                    );
                }
            }
            EventStatus::Die => {
                if let Err(e) = self
                    .bounded(container_id, self.handle_die(&event))
                    .await
                {
                    error!(
                        "Failed to handle death of container {}: {}",
                        short_id(container_id),
                        e
                    );
                }
            }
            EventStatus::Other(status) => {
                debug!(
                    "Ignoring {} event for container {}",
                    status,
                    short_id(container_id)
                );
            }
        }
    }

    /// Run start logic for an already-running container
    ///
    /// Used to replay containers found at startup. Unlabeled containers are
    /// skipped and count as success.
    pub async fn handle_container(&self, container_id: &str) -> Result<(), ControlError> {
        self.bounded(container_id, self.handle_start(container_id))
            .await
    }

    /// Stop tunnels whose hostname no running container claims any more
    ///
    /// `running` is the runtime's current container list. Returns how many
    /// tunnels were stopped and unregistered. A container that vanished since
    /// the list was taken claims nothing; any other inspection failure aborts
    /// before anything is stopped.
    pub async fn reconcile(&self, running: &[String]) -> Result<usize, ControlError> {
        let mut claimed = HashSet::new();
        for container_id in running {
            match self.runtime.inspect(container_id).await {
                Ok(container) => {
                    let metadata = ContainerMetadata::extract(&container, &self.labels);
                    if metadata.is_opted_in() {
                        claimed.insert(metadata.hostname);
                    }
                }
                Err(RuntimeError::NotFound(_)) => {}
                Err(source) => {
                    return Err(ControlError::Inspection {
                        container_id: container_id.clone(),
                        source,
                    })
                }
            }
        }

        let mut pruned = 0;
        for hostname in self.registry.hostnames() {
            if claimed.contains(&hostname) {
                continue;
            }
            let Ok(tunnel) = self.registry.get(&hostname) else {
                continue;
            };

            match tunnel.stop().await {
                Ok(()) => {
                    if self.registry.remove_if_same(&hostname, &tunnel) {
                        info!("Stopped tunnel for {}: no running container claims it", hostname);
                        pruned += 1;
                    }
                }
                Err(e) => warn!("Failed to stop orphaned tunnel for {}: {}", hostname, e),
            }
        }

        Ok(pruned)
    }

    /// Stop and unregister every tunnel, returning how many were stopped
    pub async fn shutdown(&self) -> usize {
        let tunnels = self.registry.drain();
        let mut stopped = 0;

        for (hostname, tunnel) in tunnels {
            match tunnel.stop().await {
                Ok(()) => {
                    info!("Stopped tunnel for {}", hostname);
                    stopped += 1;
                }
                Err(e) => warn!("Failed to stop tunnel for {}: {}", hostname, e),
            }
        }

        stopped
    }

    async fn bounded<F>(&self, container_id: &str, work: F) -> Result<(), ControlError>
    where
        F: Future<Output = Result<(), ControlError>>,
    {
        match self.event_timeout {
            Some(after) => tokio::time::timeout(after, work)
                .await
                .map_err(|_| ControlError::Timeout {
                    container_id: container_id.to_string(),
                    after,
                })?,
            None => work.await,
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerDescriptor, ControlError> {
        self.runtime
            .inspect(container_id)
            .await
            .map_err(|source| ControlError::Inspection {
                container_id: container_id.to_string(),
                source,
            })
    }

    async fn handle_start(&self, container_id: &str) -> Result<(), ControlError> {
        let container = self.inspect(container_id).await?;
        let metadata = ContainerMetadata::extract(&container, &self.labels);

        if !metadata.is_opted_in() {
            debug!(
                "Container {} has no {}/{} labels, skipping",
                short_id(container_id),
                self.labels.hostname(),
                self.labels.port()
            );
            return Ok(());
        }

        info!("Container found, connecting to {}...", short_id(container_id));

        let resolved = self
            .hostname_resolver
            .resolve(&container.hostname)
            .await
            .map_err(|source| ControlError::Resolution {
                container_id: container_id.to_string(),
                source,
            })?;

        let ip = if metadata.supplied_ip.is_empty() {
            resolved.to_string()
        } else {
            debug!(
                "Using supplied address {} for {} instead of {}",
                metadata.supplied_ip,
                short_id(container_id),
                resolved
            );
            metadata.supplied_ip.clone()
        };

        let certificate = self.certificate_resolver.resolve(&metadata.hostname).await?;

        let protocol = if metadata.protocol.is_empty() {
            DEFAULT_PROTOCOL.to_string()
        } else {
            metadata.protocol.clone()
        };

        let config = TunnelConfig {
            ip,
            hostname: metadata.hostname.clone(),
            port: metadata.port.clone(),
            protocol,
        };

        let tunnel_error = |source: TransportError| ControlError::TunnelOperation {
            hostname: metadata.hostname.clone(),
            source,
        };

        let tunnel = self
            .transport
            .create_tunnel(config, certificate)
            .await
            .map_err(tunnel_error)?;
        tunnel.start().await.map_err(tunnel_error)?;

        info!("Tunnel {} started: {}", tunnel.id(), tunnel.config());

        if let Some(previous) = self.registry.put(&metadata.hostname, tunnel.clone()) {
            if previous.id() != tunnel.id() {
                info!(
                    "Replacing tunnel {} for {} with {}",
                    previous.id(),
                    metadata.hostname,
                    tunnel.id()
                );
                if let Err(e) = previous.stop().await {
                    warn!(
                        "Failed to stop replaced tunnel {} for {}: {}",
                        previous.id(),
                        metadata.hostname,
                        e
                    );
                }
            }
        }

        Ok(())
    }

    async fn handle_die(&self, event: &LifecycleEvent) -> Result<(), ControlError> {
        let container_id = event.container_id.as_str();
        let container = match self.runtime.inspect(container_id).await {
            Ok(container) => container,
            // Auto-removed containers are gone by the time `die` arrives
            Err(RuntimeError::NotFound(_)) if !event.attributes.is_empty() => {
                debug!(
                    "Container {} no longer exists, using labels from the event",
                    short_id(container_id)
                );
                ContainerDescriptor {
                    id: container_id.to_string(),
                    hostname: String::new(),
                    labels: event.attributes.clone(),
                }
            }
            Err(source) => {
                return Err(ControlError::Inspection {
                    container_id: container_id.to_string(),
                    source,
                })
            }
        };
        let hostname = ContainerMetadata::extract_hostname(&container, &self.labels);

        if hostname.is_empty() {
            trace!(
                "Container {} has no {} label, nothing to stop",
                short_id(container_id),
                self.labels.hostname()
            );
            return Ok(());
        }

        let tunnel = self.registry.get(&hostname)?;

        tunnel
            .stop()
            .await
            .map_err(|source| ControlError::TunnelOperation {
                hostname: hostname.clone(),
                source,
            })?;

        if self.registry.remove_if_same(&hostname, &tunnel) {
            info!("Tunnel for {} stopped", hostname);
        } else {
            debug!(
                "Tunnel {} for {} stopped; registry already points elsewhere",
                tunnel.id(),
                hostname
            );
        }

        Ok(())
    }
}
