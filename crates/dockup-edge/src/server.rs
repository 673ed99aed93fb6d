//! Edge listener with TLS termination and SNI routing

use crate::routes::{BackendProtocol, EdgeRoutes};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Client sent no SNI")]
    MissingSni,

    #[error("No route found for SNI: {0}")]
    NoRoute(String),

    #[error("Failed to connect to backend {target}: {reason}")]
    Backend { target: SocketAddr, reason: String },

    #[error("Failed to bind to {address}:{port}: {reason}")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct EdgeServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for EdgeServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 443)),
        }
    }
}

/// Bound edge listener
pub struct EdgeServer {
    listener: TcpListener,
    routes: Arc<EdgeRoutes>,
    acceptor: TlsAcceptor,
    connector: TlsConnector,
}

impl EdgeServer {
    /// Bind the listener and build the TLS configuration
    ///
    /// Certificates are resolved per handshake from `routes`, so tunnels can be
    /// added and removed while the server runs.
    pub async fn bind(
        config: EdgeServerConfig,
        routes: Arc<EdgeRoutes>,
    ) -> Result<Self, EdgeError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut server_config = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| EdgeError::TlsError(e.to_string()))?
            .with_no_client_auth()
            .with_cert_resolver(routes.clone());
        // Bytes are proxied unmodified, so only offer what every backend speaks
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let client_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| EdgeError::TlsError(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            EdgeError::BindError {
                address: config.bind_addr.ip().to_string(),
                port: config.bind_addr.port(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            listener,
            routes,
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, EdgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<(), EdgeError> {
        info!("Edge listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let acceptor = self.acceptor.clone();
                    let connector = self.connector.clone();
                    let routes = self.routes.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, peer_addr, acceptor, connector, routes)
                                .await
                        {
                            debug!("Edge connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Edge listener accept error: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        peer_addr: SocketAddr,
        acceptor: TlsAcceptor,
        connector: TlsConnector,
        routes: Arc<EdgeRoutes>,
    ) -> Result<(), EdgeError> {
        debug!("New edge connection from {}", peer_addr);

        // The certificate resolver rejects the handshake for unknown hostnames
        let tls_stream = acceptor.accept(stream).await.map_err(|e| {
            debug!("TLS handshake failed from {}: {}", peer_addr, e);
            EdgeError::TlsError(format!("Handshake failed: {}", e))
        })?;

        let hostname = tls_stream
            .get_ref()
            .1
            .server_name()
            .map(str::to_ascii_lowercase)
            .ok_or(EdgeError::MissingSni)?;

        // Re-check after the handshake: the tunnel may have stopped meanwhile
        let route = routes
            .lookup(&hostname)
            .ok_or_else(|| EdgeError::NoRoute(hostname.clone()))?;

        debug!(
            "Routing {} from {} to {}://{} (tunnel {})",
            hostname, peer_addr, route.protocol, route.target, route.tunnel_id
        );

        let backend = TcpStream::connect(route.target)
            .await
            .map_err(|e| EdgeError::Backend {
                target: route.target,
                reason: e.to_string(),
            })?;

        match route.protocol {
            BackendProtocol::Http => Self::proxy(tls_stream, backend, &hostname).await,
            BackendProtocol::Https => {
                let server_name = ServerName::try_from(hostname.clone())
                    .map_err(|e| EdgeError::TlsError(e.to_string()))?;
                let backend = connector.connect(server_name, backend).await.map_err(|e| {
                    EdgeError::Backend {
                        target: route.target,
                        reason: format!("TLS to backend failed: {}", e),
                    }
                })?;
                Self::proxy(tls_stream, backend, &hostname).await
            }
        }
    }

    async fn proxy<C, B>(mut client: C, mut backend: B, hostname: &str) -> Result<(), EdgeError>
    where
        C: AsyncRead + AsyncWrite + Unpin,
        B: AsyncRead + AsyncWrite + Unpin,
    {
        let opened_at = Instant::now();
        match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
            Ok((received, sent)) => {
                debug!(
                    "Edge connection closed for {} ({}ms, ↓{}B ↑{}B)",
                    hostname,
                    opened_at.elapsed().as_millis(),
                    received,
                    sent
                );
                Ok(())
            }
            Err(e) => {
                warn!("Edge proxy error for {}: {}", hostname, e);
                Err(e.into())
            }
        }
    }
}
