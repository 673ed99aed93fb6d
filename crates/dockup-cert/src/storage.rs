//! Certificate storage

use crate::Certificate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, trace};

/// Certificate storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Certificate not found: {0}")]
    NotFound(String),

    #[error("Invalid domain for certificate lookup: {0}")]
    InvalidDomain(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid certificate for {0}: {1}")]
    Parse(String, String),
}

/// A source of certificates keyed by root domain
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Find the certificate covering `root_domain` (e.g. `example.co.uk`)
    async fn find(&self, root_domain: &str) -> Result<Arc<Certificate>, StoreError>;
}

/// Certificates read from PEM files in a directory
///
/// For a root domain `example.com` the store looks for `example.com.pem`
/// holding both the chain and the key, then for the pair `example.com.crt` and
/// `example.com.key`. Files are read on every lookup so replaced certificates
/// are picked up without a restart.
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    dir: PathBuf,
}

impl FileCertificateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn validate_domain(root_domain: &str) -> Result<(), StoreError> {
        let invalid = root_domain.is_empty()
            || root_domain.starts_with('.')
            || root_domain.contains(|c: char| c == '/' || c == '\\')
            || root_domain.contains("..");
        if invalid {
            return Err(StoreError::InvalidDomain(root_domain.to_string()));
        }
        Ok(())
    }

    /// Read a file, mapping "not found" to `None`
    async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn find(&self, root_domain: &str) -> Result<Arc<Certificate>, StoreError> {
        Self::validate_domain(root_domain)?;

        let pem_path = self.dir.join(format!("{}.pem", root_domain));
        trace!("Looking for certificate at {}", pem_path.display());
        if let Some(pem) = Self::read_optional(&pem_path).await? {
            debug!("Loaded certificate for {} from {}", root_domain, pem_path.display());
            return Certificate::from_pem(root_domain, &pem, &pem).map(Arc::new);
        }

        let crt_path = self.dir.join(format!("{}.crt", root_domain));
        let key_path = self.dir.join(format!("{}.key", root_domain));
        trace!("Looking for certificate at {}", crt_path.display());
        let Some(cert_pem) = Self::read_optional(&crt_path).await? else {
            return Err(StoreError::NotFound(root_domain.to_string()));
        };
        let key_pem = tokio::fs::read(&key_path)
            .await
            .map_err(|source| StoreError::Io {
                path: key_path.clone(),
                source,
            })?;

        debug!("Loaded certificate for {} from {}", root_domain, crt_path.display());
        Certificate::from_pem(root_domain, &cert_pem, &key_pem).map(Arc::new)
    }
}

/// In-memory certificate store
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    certificates: RwLock<HashMap<String, Arc<Certificate>>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a certificate under its domain, replacing any previous one
    pub fn insert(&self, cert: Certificate) {
        debug!("Storing certificate for domain: {}", cert.domain);
        let mut certs = self
            .certificates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        certs.insert(cert.domain.clone(), Arc::new(cert));
    }

    pub fn remove(&self, domain: &str) -> Option<Arc<Certificate>> {
        let mut certs = self
            .certificates
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        certs.remove(domain)
    }

    /// List all domains with certificates
    pub fn domains(&self) -> Vec<String> {
        let certs = self
            .certificates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        certs.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.certificates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn find(&self, root_domain: &str) -> Result<Arc<Certificate>, StoreError> {
        trace!("Retrieving certificate for domain: {}", root_domain);
        let certs = self
            .certificates
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        certs
            .get(root_domain)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(root_domain.to_string()))
    }
}
