//! Process configuration
//!
//! Values come from three layers: command line (or environment), an optional
//! YAML file, and built-in defaults, in that order of precedence.

use anyhow::{bail, Context, Result};
use dockup_control::RetryPolicy;
use dockup_proto::DEFAULT_LABEL_PREFIX;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CERTS_DIR: &str = "/certs";
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
    443,
);
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// One layer of optional settings
///
/// Both the YAML file and the parsed command line are turned into a layer;
/// unset fields fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct ConfigLayer {
    pub docker_host: Option<String>,
    pub certs_dir: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub label_prefix: Option<String>,
    pub resolve_attempts: Option<u32>,
    pub resolve_delay_secs: Option<u64>,
    pub event_timeout_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub log_level: Option<String>,
}

impl ConfigLayer {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Invalid configuration file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("In {}", path.display()))
    }

    /// Fill every unset field from `lower`
    pub fn or(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            docker_host: self.docker_host.or(lower.docker_host),
            certs_dir: self.certs_dir.or(lower.certs_dir),
            listen: self.listen.or(lower.listen),
            label_prefix: self.label_prefix.or(lower.label_prefix),
            resolve_attempts: self.resolve_attempts.or(lower.resolve_attempts),
            resolve_delay_secs: self.resolve_delay_secs.or(lower.resolve_delay_secs),
            event_timeout_secs: self.event_timeout_secs.or(lower.event_timeout_secs),
            reconnect_delay_secs: self.reconnect_delay_secs.or(lower.reconnect_delay_secs),
            log_level: self.log_level.or(lower.log_level),
        }
    }
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub docker_host: Option<String>,
    pub certs_dir: PathBuf,
    pub listen: SocketAddr,
    pub label_prefix: String,
    pub retry: RetryPolicy,
    pub event_timeout: Option<Duration>,
    pub reconnect_delay: Duration,
    pub log_level: String,
}

impl Settings {
    /// Apply defaults to a merged layer and validate the result
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let defaults = RetryPolicy::default();

        let resolve_attempts = layer.resolve_attempts.unwrap_or(defaults.max_attempts);
        if resolve_attempts == 0 {
            bail!("resolve_attempts must be at least 1");
        }

        let label_prefix = layer
            .label_prefix
            .unwrap_or_else(|| DEFAULT_LABEL_PREFIX.to_string());
        if label_prefix.is_empty() {
            bail!("label_prefix must not be empty");
        }

        let event_timeout = match layer.event_timeout_secs {
            Some(0) => bail!("event_timeout_secs must be greater than 0"),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        Ok(Self {
            docker_host: layer.docker_host.filter(|h| !h.is_empty()),
            certs_dir: layer
                .certs_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CERTS_DIR)),
            listen: layer.listen.unwrap_or(DEFAULT_LISTEN),
            label_prefix,
            retry: RetryPolicy {
                max_attempts: resolve_attempts,
                delay: layer
                    .resolve_delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.delay),
            },
            event_timeout,
            reconnect_delay: Duration::from_secs(
                layer
                    .reconnect_delay_secs
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
            ),
            log_level: layer
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(ConfigLayer::default()).unwrap();

        assert_eq!(settings.docker_host, None);
        assert_eq!(settings.certs_dir, PathBuf::from("/certs"));
        assert_eq!(settings.listen, "0.0.0.0:443".parse().unwrap());
        assert_eq!(settings.label_prefix, "dockup");
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.delay, Duration::from_secs(2));
        assert_eq!(settings.event_timeout, None);
        assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_parse_yaml() {
        let layer = ConfigLayer::from_yaml(
            r#"
docker_host: unix:///var/run/docker.sock
certs_dir: /etc/dockup/certs
listen: 127.0.0.1:8443
label_prefix: edge
resolve_attempts: 3
event_timeout_secs: 30
"#,
        )
        .unwrap();

        assert_eq!(layer.docker_host.as_deref(), Some("unix:///var/run/docker.sock"));
        assert_eq!(layer.listen, Some("127.0.0.1:8443".parse().unwrap()));
        assert_eq!(layer.resolve_attempts, Some(3));
        assert_eq!(layer.resolve_delay_secs, None);

        let settings = Settings::resolve(layer).unwrap();
        assert_eq!(settings.certs_dir, PathBuf::from("/etc/dockup/certs"));
        assert_eq!(settings.label_prefix, "edge");
        assert_eq!(settings.event_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(ConfigLayer::from_yaml("lisen: 0.0.0.0:443\n").is_err());
    }

    #[test]
    fn test_command_line_beats_file() {
        let cli = ConfigLayer {
            listen: Some("127.0.0.1:9443".parse().unwrap()),
            ..Default::default()
        };
        let file = ConfigLayer {
            listen: Some("0.0.0.0:8443".parse().unwrap()),
            label_prefix: Some("edge".to_string()),
            ..Default::default()
        };

        let settings = Settings::resolve(cli.or(file)).unwrap();

        assert_eq!(settings.listen, "127.0.0.1:9443".parse().unwrap());
        assert_eq!(settings.label_prefix, "edge");
    }

    #[test]
    fn test_invalid_values() {
        let zero_attempts = ConfigLayer {
            resolve_attempts: Some(0),
            ..Default::default()
        };
        assert!(Settings::resolve(zero_attempts).is_err());

        let empty_prefix = ConfigLayer {
            label_prefix: Some(String::new()),
            ..Default::default()
        };
        assert!(Settings::resolve(empty_prefix).is_err());

        let zero_timeout = ConfigLayer {
            event_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(Settings::resolve(zero_timeout).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reconnect_delay_secs: 1").unwrap();
        writeln!(file, "log_level: dockup=debug").unwrap();

        let layer = ConfigLayer::load(file.path()).unwrap();

        assert_eq!(layer.reconnect_delay_secs, Some(1));
        assert_eq!(layer.log_level.as_deref(), Some("dockup=debug"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ConfigLayer::load(Path::new("/nonexistent/dockup.yaml")).is_err());
    }
}
