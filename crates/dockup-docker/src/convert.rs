//! Mapping between Docker API models and dockup types

use bollard::models::{ContainerInspectResponse, EventMessage};
use dockup_proto::{ContainerDescriptor, LifecycleEvent};

/// Convert a Docker event into a lifecycle event
///
/// Returns `None` for events without an action or an actor ID. The actor
/// attributes (container labels plus `name` and `image`) are kept on the
/// event.
pub fn lifecycle_event_from_message(message: EventMessage) -> Option<LifecycleEvent> {
    let action = message.action.filter(|a| !a.is_empty())?;
    let actor = message.actor?;
    let container_id = actor.id.filter(|id| !id.is_empty())?;

    Some(
        LifecycleEvent::new(action, container_id)
            .with_attributes(actor.attributes.unwrap_or_default()),
    )
}

/// Reduce an inspection to the fields the controller reads
///
/// `requested_id` is used when the response carries no ID of its own.
pub fn descriptor_from_inspect(
    requested_id: &str,
    response: ContainerInspectResponse,
) -> ContainerDescriptor {
    let id = response
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| requested_id.to_string());

    let (hostname, labels) = match response.config {
        Some(config) => (
            config.hostname.unwrap_or_default(),
            config.labels.unwrap_or_default(),
        ),
        None => (String::new(), Default::default()),
    };

    ContainerDescriptor {
        id,
        hostname,
        labels,
    }
}
