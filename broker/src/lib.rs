//! AgentHub Broker - gRPC event routing and task-state service
//!
//! Serves the `agenthub.v1.AgentHub` service: unary publishes for messages,
//! task updates and artifacts; long-lived server streams for subscriptions;
//! and the authoritative task store with its legal state machine.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub mod validate;

use metrics::{counter, histogram};
use tonic::{Request, Response, Status};
use tracing::info;

use agenthub_core::metrics::names;
use agenthub_proto::agent_hub_server::{AgentHub, AgentHubServer};
use agenthub_proto::{
    agent_event, AgentCardEvent, AgentCardEventType, AgentEvent, AgentEventMetadata,
    CancelTaskRequest, GetTaskRequest, ListTasksRequest, ListTasksResponse, Priority,
    PublishMessageRequest, PublishResponse, PublishTaskArtifactRequest, PublishTaskUpdateRequest,
    RegisterAgentRequest, RegisterAgentResponse, SubscribeToAgentEventsRequest,
    SubscribeToMessagesRequest, SubscribeToTasksRequest, Task, TaskArtifactUpdateEvent,
    TaskState, TaskStatusUpdateEvent, TraceContext, UnregisterAgentRequest,
    UnregisterAgentResponse,
};
use agenthub_core::{
    now_timestamp, trace, AgentRegistry, BrokerConfig, DropPolicy, EventRouter, HubError,
    StreamKind, Subscription, SubscriptionFilter, SubscriptionTable, TaskQuery, TaskStore,
};

/// Routing envelope sender used for broker-originated events (cancellations).
const BROKER_AGENT_ID: &str = "agenthub.broker";

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broker-owned stores shared by every RPC handler.
#[derive(Clone)]
pub struct HubState {
    pub registry: Arc<AgentRegistry>,
    pub tasks: Arc<TaskStore>,
    pub subscriptions: Arc<SubscriptionTable>,
    pub router: Arc<EventRouter>,
    pub buffer_capacity: usize,
    pub drop_policy: DropPolicy,
}

impl HubState {
    pub fn new(config: &BrokerConfig) -> Self {
        let subscriptions = Arc::new(SubscriptionTable::new());
        Self {
            registry: Arc::new(AgentRegistry::new()),
            tasks: Arc::new(TaskStore::new()),
            router: Arc::new(EventRouter::new(Arc::clone(&subscriptions))),
            subscriptions,
            buffer_capacity: config.buffer_capacity,
            drop_policy: config.drop_policy,
        }
    }
}

#[derive(Clone)]
pub struct HubService {
    state: HubState,
}

type EventStream =
    Pin<Box<dyn futures_core::Stream<Item = std::result::Result<AgentEvent, Status>> + Send>>;

/// Removes a subscription from the table once its serving stream is dropped,
/// whether the client cancelled, the connection broke, or the disconnect
/// policy closed the buffer.
struct SubscriptionGuard {
    table: Arc<SubscriptionTable>,
    subscription_id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.table.remove(&self.subscription_id);
    }
}

fn subscription_stream(table: Arc<SubscriptionTable>, sub: Arc<Subscription>) -> EventStream {
    let guard = SubscriptionGuard {
        table,
        subscription_id: sub.id.clone(),
    };
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = sub.buffer.recv().await {
            yield Ok(event);
        }
    };
    Box::pin(stream)
}

fn record_publish(kind: &'static str, routing: &AgentEventMetadata) {
    let to_agent = if routing.to_agent_id.is_empty() {
        "broadcast".to_string()
    } else {
        routing.to_agent_id.clone()
    };
    counter!(
        names::MESSAGES_PUBLISHED_TOTAL,
        1,
        "type" => kind,
        "from_agent" => routing.from_agent_id.clone(),
        "to_agent" => to_agent
    );
}

fn record_processed(kind: &'static str, success: bool, started: Instant) {
    counter!(
        names::MESSAGES_PROCESSED_TOTAL,
        1,
        "service" => "broker",
        "type" => kind,
        "success" => if success { "true" } else { "false" }
    );
    histogram!(
        names::MESSAGE_PROCESSING_DURATION_SECONDS,
        started.elapsed().as_secs_f64(),
        "service" => "broker",
        "type" => kind
    );
}

impl HubService {
    pub fn new(state: HubState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &HubState {
        &self.state
    }

    fn wrap(
        &self,
        payload: agent_event::Payload,
        routing: AgentEventMetadata,
        trace_ctx: TraceContext,
    ) -> AgentEvent {
        AgentEvent {
            event_id: self.state.router.next_event_id(),
            timestamp: Some(now_timestamp()),
            routing: Some(routing),
            trace: Some(trace_ctx),
            payload: Some(payload),
        }
    }

    fn open_subscription(
        &self,
        agent_id: &str,
        kind: StreamKind,
        filter: SubscriptionFilter,
    ) -> Arc<Subscription> {
        let sub = Subscription::new(
            agent_id,
            kind,
            filter,
            self.state.buffer_capacity,
            self.state.drop_policy,
        );
        self.state.subscriptions.insert(Arc::clone(&sub));
        counter!(names::AGENT_CONNECTIONS_TOTAL, 1, "kind" => kind.as_str());
        sub
    }

    fn do_publish_message(
        &self,
        trace_ctx: TraceContext,
        req: PublishMessageRequest,
    ) -> agenthub_core::Result<PublishResponse> {
        let routing = validate::routing_envelope(req.routing)?;
        let message = req
            .message
            .ok_or_else(|| HubError::InvalidArgument("message is required".into()))?;
        validate::message(&message)?;
        // Task-associated messages become part of that task's history.
        if !message.task_id.is_empty()
            && !self.state.tasks.append_message(&message.task_id, message.clone())
        {
            tracing::debug!(task_id = %message.task_id, "message references unknown task");
        }
        record_publish("message", &routing);
        let event = self.wrap(agent_event::Payload::Message(message), routing, trace_ctx);
        self.state.router.route(&event);
        Ok(PublishResponse {
            event_id: event.event_id,
        })
    }

    fn do_publish_task_update(
        &self,
        trace_ctx: TraceContext,
        req: PublishTaskUpdateRequest,
    ) -> agenthub_core::Result<PublishResponse> {
        let routing = validate::routing_envelope(req.routing)?;
        let task = req
            .task
            .ok_or_else(|| HubError::InvalidArgument("task is required".into()))?;
        validate::task_update(&task)?;
        let stored = self.state.tasks.apply_update(task, &routing.from_agent_id)?;
        record_publish("task", &routing);
        let event = self.wrap(
            agent_event::Payload::StatusUpdate(TaskStatusUpdateEvent {
                task_id: stored.id.clone(),
                context_id: stored.context_id.clone(),
                status: stored.status,
            }),
            routing,
            trace_ctx,
        );
        self.state.router.route(&event);
        Ok(PublishResponse {
            event_id: event.event_id,
        })
    }

    fn do_publish_task_artifact(
        &self,
        trace_ctx: TraceContext,
        req: PublishTaskArtifactRequest,
    ) -> agenthub_core::Result<PublishResponse> {
        let routing = validate::routing_envelope(req.routing)?;
        if req.task_id.is_empty() {
            return Err(HubError::InvalidArgument("task_id cannot be empty".into()));
        }
        let artifact = req
            .artifact
            .ok_or_else(|| HubError::InvalidArgument("artifact is required".into()))?;
        validate::artifact(&artifact)?;
        let stored = self
            .state
            .tasks
            .append_artifact(&req.task_id, artifact.clone())?;
        record_publish("artifact", &routing);
        let event = self.wrap(
            agent_event::Payload::ArtifactUpdate(TaskArtifactUpdateEvent {
                task_id: stored.id,
                context_id: stored.context_id,
                artifact: Some(artifact),
            }),
            routing,
            trace_ctx,
        );
        self.state.router.route(&event);
        Ok(PublishResponse {
            event_id: event.event_id,
        })
    }
}

#[tonic::async_trait]
impl AgentHub for HubService {
    #[tracing::instrument(skip(self, request), fields(event_id = tracing::field::Empty))]
    async fn publish_message(
        &self,
        request: Request<PublishMessageRequest>,
    ) -> std::result::Result<Response<PublishResponse>, Status> {
        let started = Instant::now();
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let outcome = self.do_publish_message(trace_ctx, request.into_inner());
        record_processed("message", outcome.is_ok(), started);
        match outcome {
            Ok(resp) => {
                tracing::Span::current().record("event_id", resp.event_id.as_str());
                Ok(Response::new(resp))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, request), fields(event_id = tracing::field::Empty))]
    async fn publish_task_update(
        &self,
        request: Request<PublishTaskUpdateRequest>,
    ) -> std::result::Result<Response<PublishResponse>, Status> {
        let started = Instant::now();
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let outcome = self.do_publish_task_update(trace_ctx, request.into_inner());
        record_processed("task", outcome.is_ok(), started);
        match outcome {
            Ok(resp) => {
                tracing::Span::current().record("event_id", resp.event_id.as_str());
                Ok(Response::new(resp))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, request), fields(event_id = tracing::field::Empty))]
    async fn publish_task_artifact(
        &self,
        request: Request<PublishTaskArtifactRequest>,
    ) -> std::result::Result<Response<PublishResponse>, Status> {
        let started = Instant::now();
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let outcome = self.do_publish_task_artifact(trace_ctx, request.into_inner());
        record_processed("artifact", outcome.is_ok(), started);
        match outcome {
            Ok(resp) => {
                tracing::Span::current().record("event_id", resp.event_id.as_str());
                Ok(Response::new(resp))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[tracing::instrument(skip(self, request), fields(agent_id = tracing::field::Empty))]
    async fn register_agent(
        &self,
        request: Request<RegisterAgentRequest>,
    ) -> std::result::Result<Response<RegisterAgentResponse>, Status> {
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let req = request.into_inner();
        let card = req
            .card
            .ok_or_else(|| Status::invalid_argument("agent card is required"))?;
        if card.name.is_empty() {
            return Err(Status::invalid_argument(
                "agent card name (the agent id) cannot be empty",
            ));
        }
        tracing::Span::current().record("agent_id", card.name.as_str());

        let created = self
            .state
            .registry
            .register(card.clone(), req.subscription_tags);
        counter!(names::AGENT_CONNECTIONS_TOTAL, 1, "kind" => "register");

        let card_event = AgentCardEvent {
            r#type: if created {
                AgentCardEventType::Registered
            } else {
                AgentCardEventType::Updated
            } as i32,
            card: Some(card.clone()),
        };
        let routing = AgentEventMetadata {
            from_agent_id: card.name.clone(),
            to_agent_id: String::new(),
            event_type: "a2a.agent.card".to_string(),
            priority: Priority::Medium as i32,
            subscription_tags: vec![],
        };
        let event = self.wrap(agent_event::Payload::AgentCard(card_event), routing, trace_ctx);
        self.state.router.route(&event);

        info!(agent_id = %card.name, created, skills = card.skills.len(), "agent registered");
        Ok(Response::new(RegisterAgentResponse {
            success: true,
            error_message: String::new(),
        }))
    }

    #[tracing::instrument(skip(self, request), fields(agent_id = tracing::field::Empty))]
    async fn unregister_agent(
        &self,
        request: Request<UnregisterAgentRequest>,
    ) -> std::result::Result<Response<UnregisterAgentResponse>, Status> {
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let req = request.into_inner();
        tracing::Span::current().record("agent_id", req.agent_id.as_str());
        let card = self
            .state
            .registry
            .unregister(&req.agent_id)
            .ok_or_else(|| Status::not_found(format!("agent {} is not registered", req.agent_id)))?;

        let routing = AgentEventMetadata {
            from_agent_id: req.agent_id.clone(),
            to_agent_id: String::new(),
            event_type: "a2a.agent.card".to_string(),
            priority: Priority::Medium as i32,
            subscription_tags: vec![],
        };
        let event = self.wrap(
            agent_event::Payload::AgentCard(AgentCardEvent {
                r#type: AgentCardEventType::Unregistered as i32,
                card: Some(card),
            }),
            routing,
            trace_ctx,
        );
        self.state.router.route(&event);

        info!(agent_id = %req.agent_id, "agent unregistered");
        Ok(Response::new(UnregisterAgentResponse { success: true }))
    }

    type SubscribeToMessagesStream = EventStream;

    #[tracing::instrument(skip(self, request), fields(agent_id = tracing::field::Empty))]
    async fn subscribe_to_messages(
        &self,
        request: Request<SubscribeToMessagesRequest>,
    ) -> std::result::Result<Response<Self::SubscribeToMessagesStream>, Status> {
        let req = request.into_inner();
        if req.agent_id.is_empty() {
            return Err(Status::invalid_argument("agent_id cannot be empty"));
        }
        tracing::Span::current().record("agent_id", req.agent_id.as_str());
        let filter = SubscriptionFilter {
            context_pattern: (!req.context_pattern.is_empty()).then(|| req.context_pattern.clone()),
            ..Default::default()
        };
        let sub = self.open_subscription(&req.agent_id, StreamKind::Messages, filter);
        info!(agent_id = %req.agent_id, subscription = %sub.id, "messages subscription opened");
        Ok(Response::new(subscription_stream(
            Arc::clone(&self.state.subscriptions),
            sub,
        )))
    }

    type SubscribeToTasksStream = EventStream;

    #[tracing::instrument(skip(self, request), fields(agent_id = tracing::field::Empty))]
    async fn subscribe_to_tasks(
        &self,
        request: Request<SubscribeToTasksRequest>,
    ) -> std::result::Result<Response<Self::SubscribeToTasksStream>, Status> {
        let req = request.into_inner();
        if req.agent_id.is_empty() {
            return Err(Status::invalid_argument("agent_id cannot be empty"));
        }
        tracing::Span::current().record("agent_id", req.agent_id.as_str());
        let states: Vec<TaskState> = req.states().collect();
        let filter = SubscriptionFilter {
            context_pattern: None,
            task_types: req.task_types.clone(),
            states,
        };
        let sub = self.open_subscription(&req.agent_id, StreamKind::Tasks, filter);
        info!(agent_id = %req.agent_id, subscription = %sub.id, "tasks subscription opened");
        Ok(Response::new(subscription_stream(
            Arc::clone(&self.state.subscriptions),
            sub,
        )))
    }

    type SubscribeToAgentEventsStream = EventStream;

    #[tracing::instrument(skip(self, request), fields(subscriber_id = tracing::field::Empty))]
    async fn subscribe_to_agent_events(
        &self,
        request: Request<SubscribeToAgentEventsRequest>,
    ) -> std::result::Result<Response<Self::SubscribeToAgentEventsStream>, Status> {
        let req = request.into_inner();
        if req.subscriber_id.is_empty() {
            return Err(Status::invalid_argument("subscriber_id cannot be empty"));
        }
        tracing::Span::current().record("subscriber_id", req.subscriber_id.as_str());
        let sub = self.open_subscription(
            &req.subscriber_id,
            StreamKind::AgentEvents,
            SubscriptionFilter::default(),
        );
        info!(subscriber_id = %req.subscriber_id, subscription = %sub.id, "agent-events subscription opened");
        Ok(Response::new(subscription_stream(
            Arc::clone(&self.state.subscriptions),
            sub,
        )))
    }

    #[tracing::instrument(skip(self, request), fields(task_id = tracing::field::Empty))]
    async fn get_task(
        &self,
        request: Request<GetTaskRequest>,
    ) -> std::result::Result<Response<Task>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("task_id", req.task_id.as_str());
        let limit = (req.history_limit > 0).then_some(req.history_limit as usize);
        let task = self.state.tasks.get(&req.task_id, limit)?;
        Ok(Response::new(task))
    }

    #[tracing::instrument(skip(self, request), fields(task_id = tracing::field::Empty))]
    async fn cancel_task(
        &self,
        request: Request<CancelTaskRequest>,
    ) -> std::result::Result<Response<Task>, Status> {
        let trace_ctx = trace::from_grpc_metadata(request.metadata());
        let req = request.into_inner();
        if req.task_id.is_empty() {
            return Err(Status::invalid_argument("task_id cannot be empty"));
        }
        tracing::Span::current().record("task_id", req.task_id.as_str());
        let task = self.state.tasks.cancel(&req.task_id, &req.reason)?;

        let routing = AgentEventMetadata {
            from_agent_id: BROKER_AGENT_ID.to_string(),
            to_agent_id: String::new(),
            event_type: "a2a.task.update".to_string(),
            priority: Priority::High as i32,
            subscription_tags: vec![],
        };
        let event = self.wrap(
            agent_event::Payload::StatusUpdate(TaskStatusUpdateEvent {
                task_id: task.id.clone(),
                context_id: task.context_id.clone(),
                status: task.status.clone(),
            }),
            routing,
            trace_ctx,
        );
        self.state.router.route(&event);
        Ok(Response::new(task))
    }

    async fn list_tasks(
        &self,
        request: Request<ListTasksRequest>,
    ) -> std::result::Result<Response<ListTasksResponse>, Status> {
        let req = request.into_inner();
        let states: Vec<TaskState> = req.states().collect();
        let query = TaskQuery {
            submitter: (!req.agent_id.is_empty()).then(|| req.agent_id.clone()),
            context_id: (!req.context_id.is_empty()).then(|| req.context_id.clone()),
            states,
            since: req.since,
            limit: (req.limit > 0).then_some(req.limit as usize),
        };
        Ok(Response::new(ListTasksResponse {
            tasks: self.state.tasks.list(&query),
        }))
    }
}

pub async fn start_server(addr: SocketAddr, state: HubState) -> Result<()> {
    info!(addr = %addr, "Starting AgentHub broker gRPC server");

    let svc = HubService::new(state);

    tonic::transport::Server::builder()
        .add_service(AgentHubServer::new(svc))
        .serve(addr)
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))
}
