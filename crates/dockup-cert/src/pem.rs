//! PEM parsing helpers

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io::BufReader;

/// Parse every certificate in a PEM buffer, in order
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, String> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to parse certificate PEM: {}", e))
}

/// Parse the first private key in a PEM buffer
///
/// PKCS#1, PKCS#8 and SEC1 keys are accepted; certificates in the same buffer
/// are skipped.
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, String> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| format!("failed to parse private key PEM: {}", e))?
        .ok_or_else(|| "no private key found in PEM".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(parse_certificates(b"").unwrap().is_empty());
        assert!(parse_private_key(b"").is_err());
    }

    #[test]
    fn test_combined_pem() {
        let generated = rcgen::generate_simple_self_signed(vec!["example.com".to_string()]).unwrap();
        let combined = format!(
            "{}\n{}",
            generated.cert.pem(),
            generated.key_pair.serialize_pem()
        );

        let certs = parse_certificates(combined.as_bytes()).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(matches!(
            parse_private_key(combined.as_bytes()).unwrap(),
            PrivateKeyDer::Pkcs8(_)
        ));
    }
}
