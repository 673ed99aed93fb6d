//! Container lifecycle events

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Status carried by a lifecycle event
///
/// Only `start` and `die` drive the controller; everything else is kept
/// verbatim so it can be traced and then ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventStatus {
    Start,
    Die,
    Other(String),
}

impl EventStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EventStatus::Start => "start",
            EventStatus::Die => "die",
            EventStatus::Other(status) => status,
        }
    }
}

impl From<&str> for EventStatus {
    fn from(status: &str) -> Self {
        match status {
            "start" => EventStatus::Start,
            "die" => EventStatus::Die,
            other => EventStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for EventStatus {
    fn from(status: String) -> Self {
        EventStatus::from(status.as_str())
    }
}

impl From<EventStatus> for String {
    fn from(status: EventStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification that a container changed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub status: EventStatus,
    pub container_id: String,
    /// Attributes the runtime attached to the event (Docker copies the
    /// container's labels here)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl LifecycleEvent {
    pub fn new(status: impl Into<EventStatus>, container_id: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            container_id: container_id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Synthesize a start event, used when replaying already-running containers
    pub fn start(container_id: impl Into<String>) -> Self {
        Self::new(EventStatus::Start, container_id)
    }

    pub fn die(container_id: impl Into<String>) -> Self {
        Self::new(EventStatus::Die, container_id)
    }
}
