//! Tunnels carried by the edge listener

use crate::routes::{BackendProtocol, EdgeRoute, EdgeRoutes};
use async_trait::async_trait;
use dockup_cert::Certificate;
use dockup_proto::TunnelConfig;
use dockup_transport::{Tunnel, TransportError, TransportResult, TunnelTransport};
use rustls::sign::CertifiedKey;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Creates [`EdgeTunnel`]s that share one route table
#[derive(Debug, Clone)]
pub struct EdgeTransport {
    routes: Arc<EdgeRoutes>,
}

impl EdgeTransport {
    pub fn new(routes: Arc<EdgeRoutes>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> Arc<EdgeRoutes> {
        self.routes.clone()
    }
}

#[async_trait]
impl TunnelTransport for EdgeTransport {
    async fn create_tunnel(
        &self,
        config: TunnelConfig,
        certificate: Arc<Certificate>,
    ) -> TransportResult<Arc<dyn Tunnel>> {
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&certificate.private_key)
            .map_err(|e| {
                TransportError::TlsError(format!(
                    "Unusable private key for {}: {}",
                    certificate.domain, e
                ))
            })?;
        let certified_key = Arc::new(CertifiedKey::new(
            certificate.cert_chain.clone(),
            signing_key,
        ));

        Ok(Arc::new(EdgeTunnel {
            id: Uuid::new_v4(),
            config,
            certified_key,
            routes: self.routes.clone(),
            running: AtomicBool::new(false),
        }))
    }
}

/// A hostname served by the edge
///
/// Running means "has a route in the table". Starting never blocks on the
/// network; the listener is shared and already bound.
#[derive(Debug)]
pub struct EdgeTunnel {
    id: Uuid,
    config: TunnelConfig,
    certified_key: Arc<CertifiedKey>,
    routes: Arc<EdgeRoutes>,
    running: AtomicBool,
}

impl EdgeTunnel {
    fn build_route(&self) -> TransportResult<EdgeRoute> {
        let protocol: BackendProtocol = self
            .config
            .protocol
            .parse()
            .map_err(TransportError::UnsupportedProtocol)?;

        let ip: IpAddr = self
            .config
            .ip
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .map_err(|_| TransportError::InvalidTarget(self.config.target()))?;
        let port: u16 = self
            .config
            .port
            .parse()
            .map_err(|_| TransportError::InvalidTarget(self.config.target()))?;

        Ok(EdgeRoute {
            tunnel_id: self.id,
            target: SocketAddr::new(ip, port),
            protocol,
            certified_key: self.certified_key.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tunnel for EdgeTunnel {
    fn id(&self) -> Uuid {
        self.id
    }

    fn config(&self) -> &TunnelConfig {
        &self.config
    }

    async fn start(&self) -> TransportResult<()> {
        let route = self.build_route()?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning(self.config.hostname.clone()));
        }

        if let Some(previous) = self.routes.insert(&self.config.hostname, route) {
            debug!(
                "Edge route for {} taken over from tunnel {}",
                self.config.hostname, previous.tunnel_id
            );
        }

        info!("Tunnel {} started ({})", self.id, self.config);
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(TransportError::NotRunning(self.config.hostname.clone()));
        }

        self.routes.remove_owned(&self.config.hostname, self.id);
        info!("Tunnel {} stopped ({})", self.id, self.config.hostname);
        Ok(())
    }
}
