//! Inspected container view and the label schema that opts containers in

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix under which all routing labels live
pub const DEFAULT_LABEL_PREFIX: &str = "dockup";

/// The parts of an inspected container the controller cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Full container ID
    pub id: String,
    /// Hostname the runtime configured for the container (resolved via DNS)
    pub hostname: String,
    /// Container labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ContainerDescriptor {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            labels: HashMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Namespaced label keys
///
/// With the default prefix the keys are `dockup.hostname`, `dockup.port`,
/// `dockup.ip` and `dockup.protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSchema {
    hostname: String,
    port: String,
    ip: String,
    protocol: String,
}

impl LabelSchema {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('.');
        Self {
            hostname: format!("{}.hostname", prefix),
            port: format!("{}.port", prefix),
            ip: format!("{}.ip", prefix),
            protocol: format!("{}.protocol", prefix),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

impl Default for LabelSchema {
    fn default() -> Self {
        Self::new(DEFAULT_LABEL_PREFIX)
    }
}
