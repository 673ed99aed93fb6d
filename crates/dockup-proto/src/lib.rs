//! Shared value types for the dockup controller
//!
//! Lifecycle events as delivered by a container runtime, the inspected view of a
//! container, the label schema that opts containers in, and the fully-resolved
//! tunnel configuration handed to a transport.

pub mod container;
pub mod events;
pub mod tunnel;

pub use container::{ContainerDescriptor, LabelSchema, DEFAULT_LABEL_PREFIX};
pub use events::{EventStatus, LifecycleEvent};
pub use tunnel::{TunnelConfig, DEFAULT_PROTOCOL};

/// Length of the abbreviated container ID used in log lines
pub const SHORT_ID_LEN: usize = 12;

/// Abbreviate a container ID the way `docker ps` does
pub fn short_id(container_id: &str) -> &str {
    match container_id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &container_id[..idx],
        None => container_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_truncates() {
        let id = "4f1d2c3b4a5e6f7a8b9c0d1e2f3a4b5c";
        assert_eq!(short_id(id), "4f1d2c3b4a5e");
    }

    #[test]
    fn test_short_id_keeps_short_ids() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }
}
