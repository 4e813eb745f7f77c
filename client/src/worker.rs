//! Task-processing loop for worker agents.
//!
//! Subscribes to SUBMITTED tasks for the agent, dispatches each one to the
//! handler registered for its task type, and publishes the WORKING status,
//! any returned artifact, and the terminal status in that order.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use agenthub_proto::{
    agent_event, AgentEvent, Artifact, Message, Part, Role, TaskState,
};
use agenthub_core::trace;

use crate::{ClientError, HubClient, Result};

/// What a handler produced for one task.
pub struct HandlerOutcome {
    pub artifact: Option<Artifact>,
    /// COMPLETED or FAILED.
    pub state: TaskState,
    pub error_message: Option<String>,
}

impl HandlerOutcome {
    pub fn completed(artifact: Artifact) -> Self {
        Self {
            artifact: Some(artifact),
            state: TaskState::Completed,
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            artifact: None,
            state: TaskState::Failed,
            error_message: Some(error_message.into()),
        }
    }
}

/// User-supplied task processing logic, registered per task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        task: agenthub_proto::Task,
        update: Message,
    ) -> HandlerOutcome;
}

/// Subscription loop that feeds received tasks to registered handlers under
/// a bounded worker pool.
pub struct TaskWorker {
    client: HubClient,
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
    permits: Arc<Semaphore>,
}

impl TaskWorker {
    pub fn new(client: HubClient, worker_cap: usize) -> Self {
        Self {
            client,
            handlers: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(worker_cap.max(1))),
        }
    }

    pub fn from_config(client: HubClient, config: &agenthub_core::WorkerConfig) -> Self {
        Self::new(client, config.worker_cap)
    }

    pub fn register_handler(&self, task_type: &str, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.to_string(), handler);
    }

    /// Receive task events until the stream closes (or the caller drops the
    /// future, which cancels the subscription).
    pub async fn run(&self) -> Result<()> {
        let task_types: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        if task_types.is_empty() {
            return Err(ClientError::Internal(
                "no task handlers registered".to_string(),
            ));
        }
        let mut stream = self
            .client
            .subscribe_tasks(task_types, vec![TaskState::Submitted])
            .await?;
        info!(agent_id = %self.client.agent_id(), "task worker subscribed");

        while let Some(event) = stream.message().await? {
            self.dispatch(event);
        }
        info!(agent_id = %self.client.agent_id(), "task stream ended");
        Ok(())
    }

    fn dispatch(&self, event: AgentEvent) {
        let Some(agent_event::Payload::StatusUpdate(update)) = event.payload else {
            return;
        };
        let state = update
            .status
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(TaskState::Unspecified);
        if state != TaskState::Submitted {
            return;
        }
        let tags = event
            .routing
            .as_ref()
            .map(|r| r.subscription_tags.clone())
            .unwrap_or_default();
        let Some(task_type) = tags.iter().find(|t| self.handlers.contains_key(*t)).cloned()
        else {
            warn!(task_id = %update.task_id, ?tags, "no handler for task; ignoring");
            return;
        };
        let handler = match self.handlers.get(&task_type) {
            Some(entry) => Arc::clone(entry.value()),
            None => return,
        };

        let mut client = self.client.clone();
        if let Some(event_trace) = event.trace {
            client.set_trace(trace::child_of(&event_trace));
        }
        let permits = Arc::clone(&self.permits);
        let task_id = update.task_id.clone();
        let context_id = update.context_id.clone();
        let trigger = update.status.and_then(|s| s.update).unwrap_or_default();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            if let Err(e) =
                process_task(client, handler, &task_type, &task_id, &context_id, trigger).await
            {
                error!(task_id = %task_id, error = %e, "task processing failed");
            }
        });
    }
}

fn agent_message(context_id: &str, task_id: &str, text: String) -> Message {
    Message {
        message_id: format!("msg_{}", uuid::Uuid::new_v4()),
        context_id: context_id.to_string(),
        task_id: task_id.to_string(),
        role: Role::Agent as i32,
        content: vec![Part::text(text)],
        metadata: Default::default(),
        extensions: vec![],
    }
}

async fn process_task(
    client: HubClient,
    handler: Arc<dyn TaskHandler>,
    task_type: &str,
    task_id: &str,
    context_id: &str,
    trigger: Message,
) -> Result<()> {
    // Task results go out as broadcasts so the orchestrator can correlate by
    // task id; the task-type tag is echoed for subscription filters.
    let mut routing = client.routing("", "a2a.task.update");
    routing.subscription_tags = vec![task_type.to_string()];

    client
        .publish_task_state(
            task_id,
            context_id,
            TaskState::Working,
            agent_message(context_id, task_id, format!("processing {task_type}")),
            routing.clone(),
        )
        .await?;

    let task = client.get_task(task_id, 0).await?;
    let outcome = handler.handle(task, trigger).await;

    if let Some(artifact) = outcome.artifact {
        let mut artifact_routing = client.routing("", "a2a.task.artifact");
        artifact_routing.subscription_tags = vec![task_type.to_string()];
        client
            .publish_task_artifact(task_id, artifact, artifact_routing)
            .await?;
    }

    let (state, text) = match outcome.state {
        TaskState::Failed => (
            TaskState::Failed,
            outcome
                .error_message
                .unwrap_or_else(|| "task failed".to_string()),
        ),
        _ => (TaskState::Completed, "done".to_string()),
    };
    client
        .publish_task_state(
            task_id,
            context_id,
            state,
            agent_message(context_id, task_id, text),
            routing,
        )
        .await?;
    Ok(())
}
