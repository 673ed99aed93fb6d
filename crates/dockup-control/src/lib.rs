//! Container-lifecycle-driven tunnel control
//!
//! [`TunnelController`] turns container `start` and `die` events into tunnel
//! starts and stops. For each started container it reads the routing labels,
//! resolves the container's address, finds a certificate for the declared
//! hostname and asks a [`dockup_transport::TunnelTransport`] for a tunnel,
//! keeping the result in a [`TunnelRegistry`] keyed by hostname.
//! [`EventWatcher`] feeds the controller from a [`ContainerRuntime`].

pub mod certificate;
pub mod handler;
pub mod metadata;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod watcher;

pub use certificate::{root_domain, CertificateError, CertificateResolver};
pub use handler::{ControlError, TunnelController};
pub use metadata::{get_label, normalize_hostname, ContainerMetadata};
pub use registry::{RegistryError, TunnelRegistry};
pub use resolver::{HostnameResolver, Lookup, ResolveError, RetryPolicy, SystemLookup};
pub use runtime::{ContainerRuntime, EventStream, RuntimeError};
pub use watcher::{EventWatcher, RecoveryReport, Subscription};
