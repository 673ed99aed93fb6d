//! Routing metadata read from container labels

use dockup_proto::{ContainerDescriptor, LabelSchema};
use std::collections::HashMap;

/// Value of a label, or the empty string when the label is absent
pub fn get_label(labels: &HashMap<String, String>, key: &str) -> String {
    labels.get(key).cloned().unwrap_or_default()
}

/// Canonical form of a public hostname: ASCII-lowercased, surrounding
/// whitespace and trailing dots removed
///
/// Registry keys and edge routes both use this form, so labels differing only
/// in case name the same tunnel.
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Routing labels of one container
///
/// Empty strings mean "not set". A container is exposed only when both
/// `hostname` and `port` are set. `hostname` is normalized with
/// [`normalize_hostname`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerMetadata {
    pub hostname: String,
    pub port: String,
    pub supplied_ip: String,
    pub protocol: String,
}

impl ContainerMetadata {
    pub fn extract(container: &ContainerDescriptor, schema: &LabelSchema) -> Self {
        Self {
            hostname: Self::extract_hostname(container, schema),
            port: get_label(&container.labels, schema.port()),
            supplied_ip: get_label(&container.labels, schema.ip()),
            protocol: get_label(&container.labels, schema.protocol()),
        }
    }

    /// Only the hostname label (all a stop needs)
    pub fn extract_hostname(container: &ContainerDescriptor, schema: &LabelSchema) -> String {
        normalize_hostname(&get_label(&container.labels, schema.hostname()))
    }

    pub fn is_opted_in(&self) -> bool {
        !self.hostname.is_empty() && !self.port.is_empty()
    }
}
