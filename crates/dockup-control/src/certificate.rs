//! Certificate selection by root domain
//!
//! Certificates are provisioned once per registrable domain (eTLD+1), so
//! `a.example.com` and `b.example.com` share the `example.com` certificate
//! and `shop.example.co.uk` uses `example.co.uk`.

use dockup_cert::{Certificate, CertificateStore, StoreError};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Certificate lookup errors
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Cannot derive root domain from {hostname:?}: {reason}")]
    InvalidHostname {
        hostname: String,
        reason: &'static str,
    },

    #[error("No certificate for {hostname} (root domain {root_domain})")]
    NotFound {
        hostname: String,
        root_domain: String,
    },

    #[error("Certificate lookup for {root_domain} failed: {source}")]
    Store {
        root_domain: String,
        #[source]
        source: StoreError,
    },
}

/// Registrable domain of `hostname`, lowercased
///
/// Fails for empty names, names with empty labels, IP literals, and names
/// that are themselves a public suffix.
pub fn root_domain(hostname: &str) -> Result<String, CertificateError> {
    let invalid = |reason| CertificateError::InvalidHostname {
        hostname: hostname.to_string(),
        reason,
    };

    let normalized = hostname.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(invalid("empty hostname"));
    }
    if normalized.starts_with('.') || normalized.ends_with('.') || normalized.contains("..") {
        return Err(invalid("empty label"));
    }
    if normalized.parse::<IpAddr>().is_ok() {
        return Err(invalid("IP address"));
    }

    psl::domain_str(&normalized)
        .map(str::to_string)
        .ok_or_else(|| invalid("hostname is a public suffix"))
}

/// Finds the certificate that covers a hostname
#[derive(Clone)]
pub struct CertificateResolver {
    store: Arc<dyn CertificateStore>,
}

impl CertificateResolver {
    pub fn new(store: Arc<dyn CertificateStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, hostname: &str) -> Result<Arc<Certificate>, CertificateError> {
        let root_domain = root_domain(hostname)?;
        debug!("Looking up certificate for {} ({})", hostname, root_domain);

        match self.store.find(&root_domain).await {
            Ok(certificate) => Ok(certificate),
            Err(StoreError::NotFound(_)) => Err(CertificateError::NotFound {
                hostname: hostname.to_string(),
                root_domain,
            }),
            Err(source) => Err(CertificateError::Store {
                root_domain,
                source,
            }),
        }
    }
}

impl std::fmt::Debug for CertificateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateResolver").finish_non_exhaustive()
    }
}
