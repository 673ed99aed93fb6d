//! Transport abstraction for tunnels
//!
//! The controller never touches sockets. It hands a [`TunnelConfig`] and a
//! [`Certificate`] to a [`TunnelTransport`], gets back a [`Tunnel`], and only
//! ever calls `start` and `stop` on it.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        dockup-control        │
//! └──────────────────────────────┘
//!                │ create_tunnel / start / stop
//!                ↓
//! ┌──────────────────────────────┐
//! │  dockup-transport (traits)   │
//! └──────────────────────────────┘
//!                │ implemented by
//!                ↓
//! ┌──────────────────────────────┐
//! │ dockup-edge (TLS listener)   │
//! └──────────────────────────────┘
//! ```

use async_trait::async_trait;
use dockup_cert::Certificate;
use dockup_proto::TunnelConfig;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid target address: {0}")]
    InvalidTarget(String),

    #[error("Tunnel for {0} is not running")]
    NotRunning(String),

    #[error("Tunnel for {0} is already running")]
    AlreadyRunning(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// One running exposure of a hostname
///
/// `start` may return before traffic flows; `stop` must release everything
/// the tunnel holds.
#[async_trait]
pub trait Tunnel: Send + Sync + Debug {
    /// Unique ID of this tunnel instance
    fn id(&self) -> Uuid;

    /// Configuration the tunnel was created from
    fn config(&self) -> &TunnelConfig;

    /// Hostname the tunnel serves (its lookup identity)
    fn hostname(&self) -> &str {
        &self.config().hostname
    }

    /// Begin exposing the hostname
    async fn start(&self) -> TransportResult<()>;

    /// Stop exposing the hostname and release resources
    async fn stop(&self) -> TransportResult<()>;
}

/// Factory for tunnels
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    /// Construct (but do not start) a tunnel
    async fn create_tunnel(
        &self,
        config: TunnelConfig,
        certificate: Arc<Certificate>,
    ) -> TransportResult<Arc<dyn Tunnel>>;
}
