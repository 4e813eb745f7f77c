//! AgentHub client library
//!
//! Helpers used by agent processes: a typed publisher that stamps ids and
//! trace context onto every publish, subscription helpers for the three
//! broker streams, and a task-worker loop that dispatches received tasks to
//! registered handlers.

pub mod worker;

use tonic::transport::Channel;
use tonic::{Request, Streaming};
use tracing::debug;

use agenthub_proto::agent_hub_client::AgentHubClient;
use agenthub_proto::{
    AgentCard, AgentEvent, AgentEventMetadata, Artifact, CancelTaskRequest, GetTaskRequest,
    ListTasksRequest, ListTasksResponse, Message, Part, Priority, PublishMessageRequest,
    PublishTaskArtifactRequest, PublishTaskUpdateRequest, RegisterAgentRequest, Role,
    SubscribeToAgentEventsRequest, SubscribeToMessagesRequest, SubscribeToTasksRequest, Task,
    TaskState, TaskStatus, TraceContext,
};
use agenthub_core::trace;

pub use worker::{HandlerOutcome, TaskHandler, TaskWorker};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A connected AgentHub client bound to one agent identity.
///
/// Cheap to clone; every publish continues the client's active trace context
/// under a fresh span and injects the `traceparent` header so the broker can
/// propagate it to subscribers.
#[derive(Clone)]
pub struct HubClient {
    inner: AgentHubClient<Channel>,
    agent_id: String,
    trace: TraceContext,
}

impl HubClient {
    pub async fn connect(url: String, agent_id: impl Into<String>) -> Result<Self> {
        let inner = AgentHubClient::connect(url).await?;
        Ok(Self {
            inner,
            agent_id: agent_id.into(),
            trace: trace::generate(),
        })
    }

    /// Wrap an already-established channel (used by in-process tests).
    pub fn from_channel(channel: Channel, agent_id: impl Into<String>) -> Self {
        Self {
            inner: AgentHubClient::new(channel),
            agent_id: agent_id.into(),
            trace: trace::generate(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Continue someone else's trace (e.g. the event that triggered this
    /// work) instead of this client's own.
    pub fn set_trace(&mut self, trace: TraceContext) {
        self.trace = trace;
    }

    /// Routing envelope originating from this agent.
    pub fn routing(&self, to_agent_id: &str, event_type: &str) -> AgentEventMetadata {
        AgentEventMetadata {
            from_agent_id: self.agent_id.clone(),
            to_agent_id: to_agent_id.to_string(),
            event_type: event_type.to_string(),
            priority: Priority::Medium as i32,
            subscription_tags: vec![],
        }
    }

    /// A new message on the given context with a generated message id.
    pub fn new_message(&self, context_id: &str, role: Role, parts: Vec<Part>) -> Message {
        Message {
            message_id: format!("msg_{}", uuid::Uuid::new_v4()),
            context_id: context_id.to_string(),
            task_id: String::new(),
            role: role as i32,
            content: parts,
            metadata: Default::default(),
            extensions: vec![],
        }
    }

    fn request_with_trace<T>(&self, inner: T) -> (Request<T>, TraceContext) {
        let span = trace::child_of(&self.trace);
        let mut request = Request::new(inner);
        if let Ok(value) = trace::traceparent(&span).parse() {
            request.metadata_mut().insert(trace::keys::TRACEPARENT, value);
        }
        if let Some(state) = span.headers.get(trace::keys::TRACESTATE) {
            if let Ok(value) = state.parse() {
                request
                    .metadata_mut()
                    .insert(trace::keys::TRACESTATE, value);
            }
        }
        (request, span)
    }

    pub async fn register_agent(&self, card: AgentCard, subscription_tags: Vec<String>) -> Result<()> {
        let (request, _) = self.request_with_trace(RegisterAgentRequest {
            card: Some(card),
            subscription_tags,
        });
        let resp = self.inner.clone().register_agent(request).await?.into_inner();
        if !resp.success {
            return Err(ClientError::Internal(resp.error_message));
        }
        Ok(())
    }

    pub async fn publish_message(
        &self,
        message: Message,
        routing: AgentEventMetadata,
    ) -> Result<String> {
        let (request, span) = self.request_with_trace(PublishMessageRequest {
            message: Some(message),
            routing: Some(routing),
        });
        let resp = self.inner.clone().publish_message(request).await?.into_inner();
        debug!(event_id = %resp.event_id, trace_id = %span.trace_id, "message published");
        Ok(resp.event_id)
    }

    pub async fn publish_task_update(
        &self,
        task: Task,
        routing: AgentEventMetadata,
    ) -> Result<String> {
        let (request, _) = self.request_with_trace(PublishTaskUpdateRequest {
            task: Some(task),
            routing: Some(routing),
        });
        let resp = self
            .inner
            .clone()
            .publish_task_update(request)
            .await?
            .into_inner();
        Ok(resp.event_id)
    }

    pub async fn publish_task_artifact(
        &self,
        task_id: &str,
        artifact: Artifact,
        routing: AgentEventMetadata,
    ) -> Result<String> {
        let (request, _) = self.request_with_trace(PublishTaskArtifactRequest {
            task_id: task_id.to_string(),
            artifact: Some(artifact),
            routing: Some(routing),
        });
        let resp = self
            .inner
            .clone()
            .publish_task_artifact(request)
            .await?
            .into_inner();
        Ok(resp.event_id)
    }

    /// Convenience for publishing a status transition on a task.
    pub async fn publish_task_state(
        &self,
        task_id: &str,
        context_id: &str,
        state: TaskState,
        update: Message,
        routing: AgentEventMetadata,
    ) -> Result<String> {
        let task = Task {
            id: task_id.to_string(),
            context_id: context_id.to_string(),
            status: Some(TaskStatus {
                state: state as i32,
                update: Some(update),
                timestamp: None,
            }),
            history: vec![],
            artifacts: vec![],
            metadata: Default::default(),
        };
        self.publish_task_update(task, routing).await
    }

    pub async fn subscribe_messages(
        &self,
        context_pattern: Option<String>,
    ) -> Result<Streaming<AgentEvent>> {
        let (request, _) = self.request_with_trace(SubscribeToMessagesRequest {
            agent_id: self.agent_id.clone(),
            context_pattern: context_pattern.unwrap_or_default(),
        });
        Ok(self
            .inner
            .clone()
            .subscribe_to_messages(request)
            .await?
            .into_inner())
    }

    pub async fn subscribe_tasks(
        &self,
        task_types: Vec<String>,
        states: Vec<TaskState>,
    ) -> Result<Streaming<AgentEvent>> {
        let (request, _) = self.request_with_trace(SubscribeToTasksRequest {
            agent_id: self.agent_id.clone(),
            task_types,
            states: states.into_iter().map(|s| s as i32).collect(),
        });
        Ok(self
            .inner
            .clone()
            .subscribe_to_tasks(request)
            .await?
            .into_inner())
    }

    pub async fn subscribe_agent_events(&self) -> Result<Streaming<AgentEvent>> {
        let (request, _) = self.request_with_trace(SubscribeToAgentEventsRequest {
            subscriber_id: self.agent_id.clone(),
        });
        Ok(self
            .inner
            .clone()
            .subscribe_to_agent_events(request)
            .await?
            .into_inner())
    }

    pub async fn get_task(&self, task_id: &str, history_limit: i32) -> Result<Task> {
        let (request, _) = self.request_with_trace(GetTaskRequest {
            task_id: task_id.to_string(),
            history_limit,
        });
        Ok(self.inner.clone().get_task(request).await?.into_inner())
    }

    pub async fn cancel_task(&self, task_id: &str, reason: &str) -> Result<Task> {
        let (request, _) = self.request_with_trace(CancelTaskRequest {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(self.inner.clone().cancel_task(request).await?.into_inner())
    }

    pub async fn list_tasks(&self, request: ListTasksRequest) -> Result<ListTasksResponse> {
        let (request, _) = self.request_with_trace(request);
        Ok(self.inner.clone().list_tasks(request).await?.into_inner())
    }
}
