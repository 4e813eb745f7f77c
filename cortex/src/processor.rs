//! The orchestrator core: per-session state updates, pending-task
//! correlation, and decision execution.
//!
//! Lock discipline: the per-session mutex is held for state reads/writes
//! only. It is always released before `decide()` runs and re-acquired to
//! execute the returned actions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use agenthub_client::HubClient;
use agenthub_core::json;
use agenthub_core::metrics::names;
use agenthub_proto::{
    agent_event, AgentCard, AgentCardEvent, AgentCardEventType, AgentEvent, AgentEventMetadata,
    Message, Part, Priority, Role, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};
use agenthub_core::CortexConfig;

use crate::engine::{Action, Decision, DecisionEngine, Trigger, TriggerKind};
use crate::state::{ConversationState, SessionStore, TaskContext};
use crate::{CortexError, Result};

pub const CORTEX_AGENT_ID: &str = "cortex";

/// Session id for messages published without a context.
const DEFAULT_SESSION: &str = "default";

/// Outbound seam between the orchestrator and the broker, so decision
/// execution can be exercised without a wire.
#[async_trait]
pub trait OutboundPublisher: Send + Sync {
    async fn publish_message(&self, message: Message, routing: AgentEventMetadata) -> Result<()>;
    async fn publish_task(&self, task: Task, routing: AgentEventMetadata) -> Result<()>;

    /// The authoritative task record, when a broker connection exists.
    /// Artifact events and terminal statuses arrive on different streams, so
    /// a resolver without collected artifacts re-reads the task store.
    async fn fetch_task(&self, _task_id: &str) -> Result<Option<Task>> {
        Ok(None)
    }
}

/// Production publisher backed by the client library.
pub struct HubPublisher {
    client: HubClient,
}

impl HubPublisher {
    pub fn new(client: HubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OutboundPublisher for HubPublisher {
    async fn publish_message(&self, message: Message, routing: AgentEventMetadata) -> Result<()> {
        self.client
            .publish_message(message, routing)
            .await
            .map(|_| ())
            .map_err(|e| CortexError::Publish(e.to_string()))
    }

    async fn publish_task(&self, task: Task, routing: AgentEventMetadata) -> Result<()> {
        self.client
            .publish_task_update(task, routing)
            .await
            .map(|_| ())
            .map_err(|e| CortexError::Publish(e.to_string()))
    }

    async fn fetch_task(&self, task_id: &str) -> Result<Option<Task>> {
        match self.client.get_task(task_id, 0).await {
            Ok(task) => Ok(Some(task)),
            Err(agenthub_client::ClientError::Rpc(status))
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(CortexError::Publish(e.to_string())),
        }
    }
}

pub struct Cortex {
    agent_id: String,
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn DecisionEngine>,
    publisher: Arc<dyn OutboundPublisher>,
    agents: DashMap<String, AgentCard>,
    decide_permits: Semaphore,
    decision_timeout: Duration,
}

fn session_of(context_id: &str) -> String {
    if context_id.is_empty() {
        DEFAULT_SESSION.to_string()
    } else {
        context_id.to_string()
    }
}

fn record_processed(kind: &'static str, success: bool, started: Instant) {
    counter!(
        names::MESSAGES_PROCESSED_TOTAL,
        1,
        "service" => "cortex",
        "type" => kind,
        "success" => if success { "true" } else { "false" }
    );
    histogram!(
        names::MESSAGE_PROCESSING_DURATION_SECONDS,
        started.elapsed().as_secs_f64(),
        "service" => "cortex",
        "type" => kind
    );
}

impl Cortex {
    pub fn new(
        config: &CortexConfig,
        store: Arc<dyn SessionStore>,
        engine: Arc<dyn DecisionEngine>,
        publisher: Arc<dyn OutboundPublisher>,
    ) -> Self {
        Self {
            agent_id: CORTEX_AGENT_ID.to_string(),
            store,
            engine,
            publisher,
            agents: DashMap::new(),
            decide_permits: Semaphore::new(config.worker_cap.max(1)),
            decision_timeout: config.decision_timeout,
        }
    }

    /// Capability card the orchestrator registers under.
    pub fn agent_card() -> AgentCard {
        AgentCard {
            protocol_version: "0.2".to_string(),
            name: CORTEX_AGENT_ID.to_string(),
            description: "Session orchestrator and task router".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: None,
            skills: vec![],
        }
    }

    pub fn registered_agents(&self) -> Vec<AgentCard> {
        self.agents.iter().map(|e| e.value().clone()).collect()
    }

    fn routing(&self, to_agent_id: &str, event_type: &str) -> AgentEventMetadata {
        AgentEventMetadata {
            from_agent_id: self.agent_id.clone(),
            to_agent_id: to_agent_id.to_string(),
            event_type: event_type.to_string(),
            priority: Priority::Medium as i32,
            subscription_tags: vec![],
        }
    }

    /// Dispatch one received broker event.
    pub async fn handle_event(&self, event: AgentEvent) -> Result<()> {
        match event.payload {
            Some(agent_event::Payload::Message(message)) => {
                let started = Instant::now();
                let result = self.handle_message(message).await;
                record_processed("message", result.is_ok(), started);
                result
            }
            Some(agent_event::Payload::StatusUpdate(update)) => {
                let started = Instant::now();
                let result = self.handle_status(update).await;
                record_processed("task", result.is_ok(), started);
                result
            }
            Some(agent_event::Payload::ArtifactUpdate(update)) => {
                let started = Instant::now();
                let result = self.handle_artifact(update).await;
                record_processed("artifact", result.is_ok(), started);
                result
            }
            Some(agent_event::Payload::AgentCard(card_event)) => {
                self.handle_agent_card(card_event);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Handle an inbound A2A message on its session.
    #[tracing::instrument(skip(self, message), fields(message_id = %message.message_id, session = tracing::field::Empty))]
    pub async fn handle_message(&self, message: Message) -> Result<()> {
        let session_id = session_of(&message.context_id);
        tracing::Span::current().record("session", session_id.as_str());
        let handle = self.store.session(&session_id).await;

        let (history, trigger) = {
            let mut state = handle.lock().await;
            state.messages.push(message.clone());

            let resolved = (message.role() == Role::Agent && !message.task_id.is_empty())
                .then(|| state.pending_tasks.remove(&message.task_id))
                .flatten();
            let trigger = match resolved {
                Some(ctx) => {
                    debug!(task_id = %ctx.task_id, "pending task resolved by agent message");
                    Trigger {
                        kind: TriggerKind::TaskResult,
                        message: message.clone(),
                        artifacts: ctx.artifacts,
                    }
                }
                None => Trigger {
                    kind: TriggerKind::from_metadata(
                        message.metadata.get("task_type").map(String::as_str),
                    ),
                    message: message.clone(),
                    artifacts: vec![],
                },
            };
            (state.messages.clone(), trigger)
        };

        self.decide_and_execute(&session_id, handle, history, trigger)
            .await
    }

    /// Handle a task status update: terminal states resolve pending tasks.
    pub async fn handle_status(&self, update: TaskStatusUpdateEvent) -> Result<()> {
        let Some(status) = update.status else {
            return Ok(());
        };
        if !status.state().is_terminal() {
            return Ok(());
        }
        let session_id = session_of(&update.context_id);
        let handle = self.store.session(&session_id).await;

        let (history, mut trigger) = {
            let mut state = handle.lock().await;
            let Some(mut ctx) = state.pending_tasks.remove(&update.task_id) else {
                return Ok(());
            };
            ctx.user_notified = true;
            info!(task_id = %update.task_id, state = ?status.state(), "pending task resolved");
            let message = status.update.unwrap_or_default();
            state.messages.push(message.clone());
            (
                state.messages.clone(),
                Trigger {
                    kind: TriggerKind::TaskResult,
                    message,
                    artifacts: ctx.artifacts,
                },
            )
        };

        // No artifact event seen yet (streams have no cross-ordering): read
        // the authoritative record instead.
        if trigger.artifacts.is_empty() {
            if let Ok(Some(task)) = self.publisher.fetch_task(&update.task_id).await {
                trigger.artifacts = task.artifacts;
            }
        }

        self.decide_and_execute(&session_id, handle, history, trigger)
            .await
    }

    /// Collect artifacts of still-pending tasks so the decision engine sees
    /// the task output once the terminal status lands.
    pub async fn handle_artifact(&self, update: TaskArtifactUpdateEvent) -> Result<()> {
        let session_id = session_of(&update.context_id);
        let handle = self.store.session(&session_id).await;
        let mut state = handle.lock().await;
        if let Some(ctx) = state.pending_tasks.get_mut(&update.task_id) {
            if let Some(artifact) = update.artifact {
                debug!(task_id = %update.task_id, artifact_id = %artifact.artifact_id, "artifact collected");
                ctx.artifacts.push(artifact);
            }
        }
        Ok(())
    }

    /// Registry updates take the agents lock only, never a session lock.
    pub fn handle_agent_card(&self, event: AgentCardEvent) {
        let kind = event.r#type();
        let Some(card) = event.card else {
            return;
        };
        match kind {
            AgentCardEventType::Unregistered => {
                self.agents.remove(&card.name);
                info!(agent = %card.name, "agent removed from registry");
            }
            _ => {
                info!(agent = %card.name, skills = card.skills.len(), "agent card recorded");
                self.agents.insert(card.name.clone(), card);
            }
        }
    }

    async fn decide_and_execute(
        &self,
        session_id: &str,
        handle: Arc<Mutex<ConversationState>>,
        history: Vec<Message>,
        trigger: Trigger,
    ) -> Result<()> {
        let agents = self.registered_agents();

        // The session lock is NOT held here; decide() may be slow.
        let decision = {
            let _permit = self
                .decide_permits
                .acquire()
                .await
                .map_err(|_| CortexError::Internal("orchestrator is shutting down".into()))?;
            match tokio::time::timeout(
                self.decision_timeout,
                self.engine.decide(history, agents, trigger.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CortexError::DecisionTimeout(self.decision_timeout)),
            }
        };

        match decision {
            Ok(decision) => self.execute(session_id, handle, &trigger, decision).await,
            Err(err) => {
                error!(session = session_id, error = %err, "decision engine failed");
                self.publish_fallback(session_id, handle).await
            }
        }
    }

    /// Execute decided actions atomically under the session lock.
    async fn execute(
        &self,
        session_id: &str,
        handle: Arc<Mutex<ConversationState>>,
        trigger: &Trigger,
        decision: Decision,
    ) -> Result<()> {
        if !decision.reasoning.is_empty() {
            debug!(session = session_id, reasoning = %decision.reasoning, "decision made");
        }
        let mut state = handle.lock().await;
        for action in decision.actions {
            match action {
                Action::ChatResponse { text } => {
                    let mut response = self.agent_text_message(session_id, "", text);
                    response
                        .metadata
                        .insert("task_type".to_string(), "chat_response".to_string());
                    state.messages.push(response.clone());
                    self.publisher
                        .publish_message(response, self.routing("", "a2a.message"))
                        .await?;
                }
                Action::TaskRequest {
                    task_type,
                    payload,
                    target_agent,
                    correlation_id,
                } => {
                    let task_id = if correlation_id.is_empty() {
                        format!("task_{}", uuid::Uuid::new_v4())
                    } else {
                        correlation_id
                    };
                    let update = Message {
                        message_id: format!("msg_{}", uuid::Uuid::new_v4()),
                        context_id: session_id.to_string(),
                        task_id: task_id.clone(),
                        role: Role::User as i32,
                        content: vec![Part::data(
                            json::json_to_struct(&payload),
                            task_type.clone(),
                        )],
                        metadata: [("task_type".to_string(), task_type.clone())].into(),
                        extensions: vec![],
                    };
                    let task = Task {
                        id: task_id.clone(),
                        context_id: session_id.to_string(),
                        status: Some(TaskStatus {
                            state: TaskState::Submitted as i32,
                            update: Some(update),
                            timestamp: None,
                        }),
                        history: vec![],
                        artifacts: vec![],
                        metadata: [("task_type".to_string(), task_type.clone())].into(),
                    };
                    let mut routing = self.routing(&target_agent, "a2a.task.update");
                    routing.subscription_tags = vec![task_type.clone()];

                    self.publisher.publish_task(task, routing).await?;
                    info!(session = session_id, task_id = %task_id, task_type = %task_type, target = %target_agent, "task requested");
                    state.pending_tasks.insert(
                        task_id.clone(),
                        TaskContext::new(task_id, task_type, trigger.message.clone()),
                    );
                }
            }
        }
        Ok(())
    }

    /// User-visible error message when the decision engine fails. Pending
    /// tasks are left untouched.
    async fn publish_fallback(
        &self,
        session_id: &str,
        handle: Arc<Mutex<ConversationState>>,
    ) -> Result<()> {
        let mut message = self.agent_text_message(
            session_id,
            "",
            "I ran into an internal error while processing that; please try again.".to_string(),
        );
        message
            .metadata
            .insert("task_type".to_string(), "chat_response".to_string());
        message
            .metadata
            .insert("error".to_string(), "decision_failed".to_string());

        let mut state = handle.lock().await;
        state.messages.push(message.clone());
        self.publisher
            .publish_message(message, self.routing("", "a2a.message"))
            .await
    }

    fn agent_text_message(&self, context_id: &str, task_id: &str, text: String) -> Message {
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

    /// Subscribe to the broker streams and process events until one closes.
    pub async fn run(self: Arc<Self>, client: &HubClient) -> Result<()> {
        let mut messages = client.subscribe_messages(None).await?;
        let mut tasks = client.subscribe_tasks(vec![], vec![]).await?;
        let mut cards = client.subscribe_agent_events().await?;
        info!("cortex subscribed to message, task and agent-card streams");

        loop {
            let next = tokio::select! {
                next = messages.message() => next,
                next = tasks.message() => next,
                next = cards.message() => next,
            };
            let Some(event) = next.map_err(agenthub_client::ClientError::from)? else {
                warn!("broker stream closed; stopping");
                break;
            };
            let cortex = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = cortex.handle_event(event).await {
                    error!(error = %e, "event handling failed");
                }
            });
        }
        Ok(())
    }
}
