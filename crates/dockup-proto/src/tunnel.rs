//! Tunnel configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol used when a container does not set one
pub const DEFAULT_PROTOCOL: &str = "http";

/// Everything a transport needs to expose one container under one hostname
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Address the container is reachable at
    pub ip: String,
    /// Public hostname the tunnel serves
    pub hostname: String,
    /// Container port traffic is forwarded to
    pub port: String,
    /// Backend protocol (`http`, `https`)
    pub protocol: String,
}

impl TunnelConfig {
    /// `ip:port` of the backend, bracketing IPv6 literals
    pub fn target(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

impl fmt::Display for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}://{}", self.hostname, self.protocol, self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ip: &str) -> TunnelConfig {
        TunnelConfig {
            ip: ip.to_string(),
            hostname: "a.example.com".to_string(),
            port: "8080".to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }

    #[test]
    fn test_target_ipv4() {
        assert_eq!(config("1.2.3.4").target(), "1.2.3.4:8080");
    }

    #[test]
    fn test_target_ipv6() {
        assert_eq!(config("fd00::2").target(), "[fd00::2]:8080");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            config("1.2.3.4").to_string(),
            "a.example.com -> http://1.2.3.4:8080"
        );
    }
}
