//! Hostname route table for the edge listener
//!
//! Routes are keyed by lowercase hostname and matched exactly against the SNI
//! the client sends. Each route owns the certificate served for its hostname,
//! so the table doubles as the rustls certificate resolver.

use dashmap::DashMap;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// How the edge talks to the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendProtocol {
    /// Plaintext to the backend
    Http,
    /// TLS to the backend, verified against web PKI roots
    Https,
}

impl FromStr for BackendProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(BackendProtocol::Http),
            "https" => Ok(BackendProtocol::Https),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for BackendProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendProtocol::Http => f.write_str("http"),
            BackendProtocol::Https => f.write_str("https"),
        }
    }
}

/// Route target information
#[derive(Debug, Clone)]
pub struct EdgeRoute {
    /// Tunnel that owns this route
    pub tunnel_id: Uuid,
    /// Container address
    pub target: SocketAddr,
    pub protocol: BackendProtocol,
    /// Certificate served for the hostname
    pub certified_key: Arc<CertifiedKey>,
}

/// Concurrent hostname -> route map
#[derive(Debug, Default)]
pub struct EdgeRoutes {
    routes: DashMap<String, EdgeRoute>,
}

impl EdgeRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route, returning the route it replaced
    pub fn insert(&self, hostname: &str, route: EdgeRoute) -> Option<EdgeRoute> {
        let hostname = normalize(hostname);
        trace!("Registering edge route: {} -> {}", hostname, route.target);
        self.routes.insert(hostname, route)
    }

    /// Remove a route only if it still belongs to `tunnel_id`
    pub fn remove_owned(&self, hostname: &str, tunnel_id: Uuid) -> bool {
        let hostname = normalize(hostname);
        let removed = self
            .routes
            .remove_if(&hostname, |_, route| route.tunnel_id == tunnel_id)
            .is_some();
        if !removed {
            debug!(
                "Route for {} no longer owned by tunnel {}, leaving it",
                hostname, tunnel_id
            );
        }
        removed
    }

    pub fn lookup(&self, hostname: &str) -> Option<EdgeRoute> {
        self.routes
            .get(&normalize(hostname))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.routes.contains_key(&normalize(hostname))
    }

    pub fn count(&self) -> usize {
        self.routes.len()
    }
}

impl ResolvesServerCert for EdgeRoutes {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let server_name = client_hello.server_name()?;
        let route = self.lookup(server_name);
        if route.is_none() {
            debug!("No edge route for SNI {}", server_name);
        }
        route.map(|route| route.certified_key)
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim_end_matches('.').to_ascii_lowercase()
}
