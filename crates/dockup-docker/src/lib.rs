//! Docker implementation of the container runtime seam
//!
//! Talks to the Docker Engine API through bollard: container events drive
//! [`dockup_control::EventWatcher`], inspections feed label extraction.

pub mod convert;
pub mod runtime;

pub use convert::{descriptor_from_inspect, lifecycle_event_from_message};
pub use runtime::{DockerConnectError, DockerRuntime, DEFAULT_TIMEOUT_SECS};
