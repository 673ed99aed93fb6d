//! Registry of running tunnels, keyed by hostname
//!
//! Safe for concurrent use by event handlers. A hostname maps to at most one
//! tunnel; registering a second tunnel for the same hostname hands back the
//! one it displaced so the caller can stop it.

use dashmap::DashMap;
use dockup_transport::Tunnel;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No tunnel registered for host: {0}")]
    NotFound(String),
}

/// Hostname to tunnel map
#[derive(Debug, Default)]
pub struct TunnelRegistry {
    tunnels: DashMap<String, Arc<dyn Tunnel>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tunnel` under `hostname`, returning the tunnel it replaced
    pub fn put(&self, hostname: &str, tunnel: Arc<dyn Tunnel>) -> Option<Arc<dyn Tunnel>> {
        trace!("Registering tunnel {} for {}", tunnel.id(), hostname);
        self.tunnels.insert(hostname.to_string(), tunnel)
    }

    pub fn get(&self, hostname: &str) -> Result<Arc<dyn Tunnel>, RegistryError> {
        self.tunnels
            .get(hostname)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotFound(hostname.to_string()))
    }

    pub fn remove(&self, hostname: &str) -> Option<Arc<dyn Tunnel>> {
        trace!("Unregistering tunnel for {}", hostname);
        self.tunnels.remove(hostname).map(|(_, tunnel)| tunnel)
    }

    /// Remove the entry for `hostname` only if it is still `tunnel`
    ///
    /// Returns false when the hostname is unregistered or now belongs to a
    /// different tunnel.
    pub fn remove_if_same(&self, hostname: &str, tunnel: &Arc<dyn Tunnel>) -> bool {
        let id = tunnel.id();
        self.tunnels
            .remove_if(hostname, |_, current| current.id() == id)
            .is_some()
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.tunnels.contains_key(hostname)
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.tunnels.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.tunnels.len()
    }

    /// Remove and return every registered tunnel
    pub fn drain(&self) -> Vec<(String, Arc<dyn Tunnel>)> {
        self.hostnames()
            .into_iter()
            .filter_map(|hostname| self.tunnels.remove(&hostname))
            .collect()
    }
}
