//! Certificate lookup for tunnel hostnames
//!
//! Certificates are provisioned per root domain (usually as wildcards) by
//! something outside dockup. This crate only finds and parses them.

pub mod pem;
pub mod storage;

pub use pem::{parse_certificates, parse_private_key};
pub use storage::{CertificateStore, FileCertificateStore, MemoryCertificateStore, StoreError};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// Certificate with private key, bound to a root domain
#[derive(Debug)]
pub struct Certificate {
    pub domain: String,
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
}

impl Certificate {
    pub fn new(
        domain: impl Into<String>,
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> Self {
        Self {
            domain: domain.into(),
            cert_chain,
            private_key,
        }
    }

    /// Build a certificate from PEM text (chain and key may share one buffer)
    pub fn from_pem(
        domain: impl Into<String>,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, StoreError> {
        let domain = domain.into();
        let cert_chain = parse_certificates(cert_pem)
            .map_err(|e| StoreError::Parse(domain.clone(), e))?;
        if cert_chain.is_empty() {
            return Err(StoreError::Parse(
                domain,
                "no certificate found in PEM".to_string(),
            ));
        }
        let private_key =
            parse_private_key(key_pem).map_err(|e| StoreError::Parse(domain.clone(), e))?;

        Ok(Self::new(domain, cert_chain, private_key))
    }
}
