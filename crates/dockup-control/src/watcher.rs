//! Event loop feeding the controller
//!
//! Each event is handled on its own task so a slow resolution for one
//! container never delays events for others.

use crate::handler::{ControlError, TunnelController};
use crate::runtime::{ContainerRuntime, EventStream, RuntimeError};
use dockup_proto::{short_id, LifecycleEvent};
use futures::future::join_all;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Outcome of replaying already-running containers
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Containers that were replayed
    pub total: usize,
    /// Containers whose start logic failed, with the reason
    pub failures: Vec<(String, ControlError)>,
    /// Tunnels stopped because no running container claims their hostname
    pub pruned: usize,
}

impl RecoveryReport {
    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }
}

/// An open event subscription
///
/// Events are pulled from the runtime as soon as the subscription exists and
/// buffered until [`EventWatcher::watch`] consumes them, so nothing emitted
/// during a replay is lost.
pub struct Subscription {
    events: EventStream,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    fn open(runtime: &dyn ContainerRuntime) -> Self {
        let mut source = runtime.events();
        let (tx, rx) = mpsc::unbounded_channel::<Result<LifecycleEvent, RuntimeError>>();

        let forwarder = tokio::spawn(async move {
            while let Some(item) = source.next().await {
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Self { events, forwarder }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Connects a [`ContainerRuntime`] to a [`TunnelController`]
pub struct EventWatcher {
    runtime: Arc<dyn ContainerRuntime>,
    controller: Arc<TunnelController>,
}

impl EventWatcher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, controller: Arc<TunnelController>) -> Self {
        Self {
            runtime,
            controller,
        }
    }

    /// Start receiving lifecycle events
    pub fn subscribe(&self) -> Subscription {
        debug!("Subscribing to container events");
        Subscription::open(self.runtime.as_ref())
    }

    /// Subscribe, replay running containers, then consume events
    ///
    /// The subscription is opened before the replay so events raised while
    /// replaying are handled afterwards. Returns like [`EventWatcher::watch`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
        let subscription = self.subscribe();

        tokio::select! {
            result = self.recover() => match result {
                Ok(report) => info!(
                    "Recovered {}/{} running containers, pruned {} stale tunnels",
                    report.succeeded(),
                    report.total,
                    report.pruned
                ),
                Err(e) => error!("Failed to list running containers: {}", e),
            },
            _ = shutdown.changed() => return Ok(()),
        }

        self.watch(subscription, shutdown).await
    }

    /// Run start logic for every running container, then stop registered
    /// tunnels that none of them claims
    ///
    /// Per-container failures are collected in the report and logged; only a
    /// failure to list containers is returned as an error.
    pub async fn recover(&self) -> Result<RecoveryReport, RuntimeError> {
        let container_ids = self.runtime.running_containers().await?;
        info!("Replaying {} running containers", container_ids.len());

        let results = join_all(
            container_ids
                .iter()
                .map(|id| self.controller.handle_container(id)),
        )
        .await;

        let mut report = RecoveryReport {
            total: container_ids.len(),
            ..Default::default()
        };
        for (container_id, result) in container_ids.iter().zip(results) {
            if let Err(e) = result {
                error!(
                    "Failed to recover container {}: {}",
                    short_id(container_id),
                    e
                );
                report.failures.push((container_id.clone(), e));
            }
        }

        match self.controller.reconcile(&container_ids).await {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => warn!("Skipping stale tunnel cleanup: {}", e),
        }

        Ok(report)
    }

    /// Consume lifecycle events until `shutdown` flips to true
    ///
    /// Returns `Ok` on shutdown and an error when the event stream fails or
    /// ends. Events already being handled are allowed to finish either way.
    pub async fn watch(
        &self,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RuntimeError> {
        let mut in_flight = JoinSet::new();

        let result = if *shutdown.borrow() {
            Ok(())
        } else {
            info!("Watching container events");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Stopping event watcher");
                            break Ok(());
                        }
                    }
                    next = subscription.events.next() => match next {
                        Some(Ok(event)) => {
                            debug!(
                                "Received {} event for container {}",
                                event.status,
                                short_id(&event.container_id)
                            );
                            let controller = self.controller.clone();
                            in_flight.spawn(async move { controller.handle_event(event).await });
                        }
                        Some(Err(e)) => break Err(e),
                        None => break Err(RuntimeError::Stream("event stream ended".to_string())),
                    },
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            error!("Event handler task failed: {}", e);
                        }
                    }
                }
            }
        };

        if !in_flight.is_empty() {
            debug!("Waiting for {} in-flight events", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Event handler task failed: {}", e);
            }
        }

        result
    }
}
