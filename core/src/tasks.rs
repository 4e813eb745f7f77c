use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use prost_types::Timestamp;
use tracing::debug;

use crate::metrics::names;
use crate::proto::{Artifact, Message, Part, Role, Task, TaskState, TaskStatus};
use crate::time::{now_timestamp, timestamp_ge};
use crate::{HubError, Result};

/// Returns whether `from -> to` is a legal task-state transition.
///
/// SUBMITTED -> WORKING | CANCELLED
/// WORKING   -> COMPLETED | FAILED | CANCELLED
/// COMPLETED, FAILED, CANCELLED are terminal. Re-publishing the current
/// state is not a transition and is rejected.
pub fn transition_allowed(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Submitted, Working) | (Submitted, Cancelled) | (Working, Completed) | (Working, Failed) | (Working, Cancelled)
    )
}

/// Filters for [`TaskStore::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Matches the agent that submitted the task.
    pub submitter: Option<String>,
    pub context_id: Option<String>,
    pub states: Vec<TaskState>,
    /// Only tasks whose last status change is at or after this instant.
    pub since: Option<Timestamp>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    task: Task,
    submitter: String,
}

fn record_transition(from: TaskState, to: TaskState, task: &Task) {
    let task_type = task
        .metadata
        .get("task_type")
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    counter!(
        names::TASK_STATE_TRANSITIONS_TOTAL,
        1,
        "from" => format!("{from:?}"),
        "to" => format!("{to:?}"),
        "task_type" => task_type
    );
}

/// In-memory authoritative task store.
///
/// Owns the task state machine: every status update is validated against the
/// legal transition table before it is recorded, update messages are appended
/// to the task history in acceptance order, and artifacts are append-only.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: DashMap<String, TaskRecord>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Apply a task status update, creating the task on first SUBMITTED.
    ///
    /// Returns the stored task after the update. The per-entry lock makes the
    /// check-then-transition atomic with respect to concurrent updates on the
    /// same task id.
    pub fn apply_update(&self, incoming: Task, submitter: &str) -> Result<Task> {
        let status = incoming
            .status
            .clone()
            .ok_or_else(|| HubError::InvalidArgument("task status is required".into()))?;
        let new_state = status.state();
        let update = status
            .update
            .clone()
            .ok_or_else(|| HubError::InvalidArgument("task status update message is required".into()))?;

        match self.tasks.entry(incoming.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                let old_state = record
                    .task
                    .status
                    .as_ref()
                    .map(|s| s.state())
                    .unwrap_or(TaskState::Unspecified);
                if !transition_allowed(old_state, new_state) {
                    return Err(HubError::FailedPrecondition(format!(
                        "illegal task transition {:?} -> {:?} for task {}",
                        old_state, new_state, incoming.id
                    )));
                }
                record.task.history.push(update);
                record.task.status = Some(TaskStatus {
                    state: new_state as i32,
                    update: status.update,
                    timestamp: Some(now_timestamp()),
                });
                record_transition(old_state, new_state, &record.task);
                debug!(task_id = %incoming.id, from = ?old_state, to = ?new_state, "task transition");
                Ok(record.task.clone())
            }
            Entry::Vacant(vacant) => {
                if new_state != TaskState::Submitted {
                    return Err(HubError::NotFound(format!(
                        "task {} does not exist; first update must be SUBMITTED",
                        incoming.id
                    )));
                }
                let task = Task {
                    id: incoming.id.clone(),
                    context_id: incoming.context_id.clone(),
                    status: Some(TaskStatus {
                        state: new_state as i32,
                        update: Some(update.clone()),
                        timestamp: Some(now_timestamp()),
                    }),
                    history: vec![update],
                    artifacts: Vec::new(),
                    metadata: incoming.metadata.clone(),
                };
                debug!(task_id = %incoming.id, "task created");
                record_transition(TaskState::Unspecified, new_state, &task);
                let record = vacant.insert(TaskRecord {
                    task,
                    submitter: submitter.to_string(),
                });
                Ok(record.task.clone())
            }
        }
    }

    /// Record a message observed on the wire into its task's history.
    ///
    /// Returns `false` when the task is unknown; plain message publishes
    /// must not fail on a dangling task reference.
    pub fn append_message(&self, task_id: &str, message: Message) -> bool {
        match self.tasks.get_mut(task_id) {
            Some(mut record) => {
                record.task.history.push(message);
                true
            }
            None => false,
        }
    }

    /// Append an artifact to an existing task.
    ///
    /// Cancelled tasks reject further artifacts.
    pub fn append_artifact(&self, task_id: &str, artifact: Artifact) -> Result<Task> {
        let mut record = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {} not found", task_id)))?;
        let state = record
            .task
            .status
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(TaskState::Unspecified);
        if state == TaskState::Cancelled {
            return Err(HubError::FailedPrecondition(format!(
                "task {} is cancelled; artifacts are no longer accepted",
                task_id
            )));
        }
        record.task.artifacts.push(artifact);
        Ok(record.task.clone())
    }

    /// Cancel a non-terminal task, recording a synthetic AGENT message with
    /// the cancellation reason.
    pub fn cancel(&self, task_id: &str, reason: &str) -> Result<Task> {
        let mut record = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {} not found", task_id)))?;
        let state = record
            .task
            .status
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(TaskState::Unspecified);
        if state.is_terminal() {
            return Err(HubError::FailedPrecondition(format!(
                "task {} is already {:?}",
                task_id, state
            )));
        }
        let update = Message {
            message_id: format!("msg_{}", uuid::Uuid::new_v4()),
            context_id: record.task.context_id.clone(),
            task_id: task_id.to_string(),
            role: Role::Agent as i32,
            content: vec![Part::text(if reason.is_empty() {
                "task cancelled".to_string()
            } else {
                reason.to_string()
            })],
            metadata: Default::default(),
            extensions: Vec::new(),
        };
        record.task.history.push(update.clone());
        record.task.status = Some(TaskStatus {
            state: TaskState::Cancelled as i32,
            update: Some(update),
            timestamp: Some(now_timestamp()),
        });
        record_transition(state, TaskState::Cancelled, &record.task);
        Ok(record.task.clone())
    }

    /// Fetch a task, optionally truncating history to the most recent N
    /// messages.
    pub fn get(&self, task_id: &str, history_limit: Option<usize>) -> Result<Task> {
        let record = self
            .tasks
            .get(task_id)
            .ok_or_else(|| HubError::NotFound(format!("task {} not found", task_id)))?;
        let mut task = record.task.clone();
        if let Some(limit) = history_limit {
            if limit > 0 && task.history.len() > limit {
                task.history = task.history.split_off(task.history.len() - limit);
            }
        }
        Ok(task)
    }

    /// List tasks matching a query. Order between tasks is unspecified.
    pub fn list(&self, query: &TaskQuery) -> Vec<Task> {
        let mut out = Vec::new();
        for entry in self.tasks.iter() {
            let record = entry.value();
            if let Some(submitter) = &query.submitter {
                if &record.submitter != submitter {
                    continue;
                }
            }
            if let Some(context_id) = &query.context_id {
                if &record.task.context_id != context_id {
                    continue;
                }
            }
            if !query.states.is_empty() {
                let state = record
                    .task
                    .status
                    .as_ref()
                    .map(|s| s.state())
                    .unwrap_or(TaskState::Unspecified);
                if !query.states.contains(&state) {
                    continue;
                }
            }
            if let Some(since) = &query.since {
                let fresh = record
                    .task
                    .status
                    .as_ref()
                    .and_then(|s| s.timestamp.as_ref())
                    .map(|ts| timestamp_ge(ts, since))
                    .unwrap_or(false);
                if !fresh {
                    continue;
                }
            }
            out.push(record.task.clone());
            if let Some(limit) = query.limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        out
    }
}
