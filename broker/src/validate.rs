//! Publish-side validation shared by the broker RPC handlers.

use agenthub_proto::{AgentEventMetadata, Artifact, Message, Priority, Role, Task};
use agenthub_core::HubError;

type Result<T> = std::result::Result<T, HubError>;

/// Require a routing envelope with a sender; normalize unspecified priority
/// to MEDIUM.
pub fn routing_envelope(routing: Option<AgentEventMetadata>) -> Result<AgentEventMetadata> {
    let mut routing =
        routing.ok_or_else(|| HubError::InvalidArgument("routing metadata is required".into()))?;
    if routing.from_agent_id.is_empty() {
        return Err(HubError::InvalidArgument(
            "routing.from_agent_id cannot be empty".into(),
        ));
    }
    if routing.priority() == Priority::Unspecified {
        routing.priority = Priority::Medium as i32;
    }
    Ok(routing)
}

pub fn message(message: &Message) -> Result<()> {
    if message.message_id.is_empty() {
        return Err(HubError::InvalidArgument("message_id cannot be empty".into()));
    }
    if message.role() == Role::Unspecified {
        return Err(HubError::InvalidArgument(
            "message role must be USER or AGENT".into(),
        ));
    }
    if message.content.is_empty() {
        return Err(HubError::InvalidArgument(
            "message must carry at least one content part".into(),
        ));
    }
    if message.content.iter().any(|part| part.is_empty()) {
        return Err(HubError::InvalidArgument(
            "message content parts cannot be empty".into(),
        ));
    }
    Ok(())
}

pub fn task_update(task: &Task) -> Result<()> {
    if task.id.is_empty() {
        return Err(HubError::InvalidArgument("task id cannot be empty".into()));
    }
    let status = task
        .status
        .as_ref()
        .ok_or_else(|| HubError::InvalidArgument("task status is required".into()))?;
    let update = status
        .update
        .as_ref()
        .ok_or_else(|| HubError::InvalidArgument("task status update message is required".into()))?;
    message(update)
}

pub fn artifact(artifact: &Artifact) -> Result<()> {
    if artifact.artifact_id.is_empty() {
        return Err(HubError::InvalidArgument(
            "artifact_id cannot be empty".into(),
        ));
    }
    if artifact.parts.is_empty() {
        return Err(HubError::InvalidArgument(
            "artifact must carry at least one part".into(),
        ));
    }
    if artifact.parts.iter().any(|part| part.is_empty()) {
        return Err(HubError::InvalidArgument(
            "artifact parts cannot be empty".into(),
        ));
    }
    Ok(())
}
