// Event routing: subscription table, bounded per-subscriber buffers, fan-out
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use metrics::{counter, decrement_gauge, increment_gauge};
use tokio::sync::Notify;
use tracing::{debug, warn, Span};

use crate::metrics::names;
use crate::proto::{agent_event, AgentEvent, TaskState};
use crate::{HubError, Result};

/// The three subscription stream kinds served by the broker.
///
/// Message and artifact events are delivered on the messages stream; task
/// status updates on the tasks stream; agent-card events on the agent-events
/// stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Messages,
    Tasks,
    AgentEvents,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Messages => "messages",
            StreamKind::Tasks => "tasks",
            StreamKind::AgentEvents => "agent_events",
        }
    }

    /// Stream kind an event payload routes to.
    pub fn of(event: &AgentEvent) -> Option<StreamKind> {
        match event.payload {
            Some(agent_event::Payload::Message(_)) => Some(StreamKind::Messages),
            Some(agent_event::Payload::ArtifactUpdate(_)) => Some(StreamKind::Messages),
            Some(agent_event::Payload::StatusUpdate(_)) => Some(StreamKind::Tasks),
            Some(agent_event::Payload::AgentCard(_)) => Some(StreamKind::AgentEvents),
            None => None,
        }
    }
}

/// What to do when a subscriber's buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// Drop the arriving event, preserving the already-buffered prefix.
    #[default]
    DropNewest,
    /// Evict the oldest buffered event to make room.
    DropOldest,
    /// Close the subscription stream.
    DisconnectSlowSubscriber,
}

impl FromStr for DropPolicy {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drop_newest" => Ok(DropPolicy::DropNewest),
            "drop_oldest" => Ok(DropPolicy::DropOldest),
            "disconnect_slow_subscriber" => Ok(DropPolicy::DisconnectSlowSubscriber),
            other => Err(HubError::Config(format!("unknown drop policy: {other}"))),
        }
    }
}

/// Match a context pattern against a context id.
///
/// Empty pattern admits everything; a trailing `*` matches by prefix;
/// anything else is an exact match.
pub fn context_matches(pattern: &str, context_id: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return context_id.starts_with(prefix);
    }
    pattern == context_id
}

/// Per-subscription filters, all optional.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// Messages stream: context id pattern (exact or trailing-`*` prefix).
    pub context_pattern: Option<String>,
    /// Tasks stream: admit only events tagged with one of these task types.
    pub task_types: Vec<String>,
    /// Tasks stream: admit only these status states.
    pub states: Vec<TaskState>,
}

impl SubscriptionFilter {
    /// Whether this filter admits the event.
    pub fn admits(&self, event: &AgentEvent) -> bool {
        match &event.payload {
            Some(agent_event::Payload::Message(message)) => self
                .context_pattern
                .as_deref()
                .map(|p| context_matches(p, &message.context_id))
                .unwrap_or(true),
            Some(agent_event::Payload::ArtifactUpdate(update)) => self
                .context_pattern
                .as_deref()
                .map(|p| context_matches(p, &update.context_id))
                .unwrap_or(true),
            Some(agent_event::Payload::StatusUpdate(update)) => {
                if !self.states.is_empty() {
                    let state = update
                        .status
                        .as_ref()
                        .map(|s| s.state())
                        .unwrap_or(TaskState::Unspecified);
                    if !self.states.contains(&state) {
                        return false;
                    }
                }
                if !self.task_types.is_empty() {
                    let tags = event
                        .routing
                        .as_ref()
                        .map(|r| r.subscription_tags.as_slice())
                        .unwrap_or(&[]);
                    if !tags.iter().any(|t| self.task_types.contains(t)) {
                        return false;
                    }
                }
                true
            }
            Some(agent_event::Payload::AgentCard(_)) | None => true,
        }
    }
}

/// Outcome of a non-blocking enqueue onto a subscriber buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    Dropped,
    Disconnected,
}

/// Bounded FIFO buffer between the router (producer) and one stream writer
/// (consumer).
///
/// The router never blocks: a full buffer applies the configured drop policy
/// and the push returns immediately. Every routed event either lands in the
/// queue (delivered counter) or bumps the dropped counter, never both.
#[derive(Debug)]
pub struct EventBuffer {
    queue: Mutex<VecDeque<AgentEvent>>,
    capacity: usize,
    policy: DropPolicy,
    notify: Notify,
    closed: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBuffer {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue. Applies the drop policy when full.
    pub fn push(&self, event: AgentEvent) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Disconnected;
        }
        let outcome = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() < self.capacity {
                queue.push_back(event);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Enqueued
            } else {
                match self.policy {
                    DropPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::Dropped
                    }
                    DropPolicy::DropOldest => {
                        queue.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        queue.push_back(event);
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                        PushOutcome::Enqueued
                    }
                    DropPolicy::DisconnectSlowSubscriber => {
                        self.closed.store(true, Ordering::Release);
                        PushOutcome::Disconnected
                    }
                }
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Await the next event in FIFO order. Returns `None` once the buffer is
    /// closed (stream teardown or the disconnect policy).
    pub async fn recv(&self) -> Option<AgentEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the buffer and discard anything still queued.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One live subscription: identity, filters and the outbound buffer.
#[derive(Debug)]
pub struct Subscription {
    pub id: String,
    pub agent_id: String,
    pub kind: StreamKind,
    pub filter: SubscriptionFilter,
    pub buffer: EventBuffer,
}

impl Subscription {
    pub fn new(
        agent_id: impl Into<String>,
        kind: StreamKind,
        filter: SubscriptionFilter,
        capacity: usize,
        policy: DropPolicy,
    ) -> Arc<Self> {
        let agent_id = agent_id.into();
        Arc::new(Self {
            id: format!("sub_{}_{}_{}", kind.as_str(), agent_id, uuid::Uuid::new_v4()),
            agent_id,
            kind,
            filter,
            buffer: EventBuffer::new(capacity, policy),
        })
    }
}

/// Registry of open subscriptions, shared between RPC handlers (open/close)
/// and the router (read-mostly fan-out).
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    subs: DashMap<String, Arc<Subscription>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sub: Arc<Subscription>) {
        increment_gauge!(names::SUBSCRIPTIONS_ACTIVE, 1.0);
        self.subs.insert(sub.id.clone(), sub);
    }

    /// Remove a subscription and close its buffer.
    pub fn remove(&self, subscription_id: &str) -> Option<Arc<Subscription>> {
        let (_, sub) = self.subs.remove(subscription_id)?;
        sub.buffer.close();
        decrement_gauge!(names::SUBSCRIPTIONS_ACTIVE, 1.0);
        Some(sub)
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Snapshot of all open subscriptions for one routing pass.
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.subs.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

/// Per-route accounting returned to the caller for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
    pub matched: usize,
    pub enqueued: usize,
    pub dropped: usize,
    pub disconnected: usize,
}

/// Computes the subscriber set for each accepted publish and fans the event
/// out with a non-blocking enqueue per subscriber.
///
/// Direct events (non-empty `to_agent_id`) go to that agent's matching
/// subscriptions only. Broadcast events go to every matching subscription
/// except the publisher's own. Agent-card events go to all open agent-event
/// subscriptions. Delivery failures never fail the publish.
#[derive(Debug)]
pub struct EventRouter {
    table: Arc<SubscriptionTable>,
    event_seq: AtomicU64,
}

impl EventRouter {
    pub fn new(table: Arc<SubscriptionTable>) -> Self {
        Self {
            table,
            event_seq: AtomicU64::new(1),
        }
    }

    pub fn table(&self) -> &Arc<SubscriptionTable> {
        &self.table
    }

    /// Broker-assigned event id, monotonic within this process.
    pub fn next_event_id(&self) -> String {
        format!("evt_{:016x}", self.event_seq.fetch_add(1, Ordering::Relaxed))
    }

    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id, matched = tracing::field::Empty, dropped = tracing::field::Empty))]
    pub fn route(&self, event: &AgentEvent) -> RouteSummary {
        let Some(kind) = StreamKind::of(event) else {
            warn!(event_id = %event.event_id, "event without payload; nothing to route");
            return RouteSummary::default();
        };
        let (from, to) = event
            .routing
            .as_ref()
            .map(|r| (r.from_agent_id.as_str(), r.to_agent_id.as_str()))
            .unwrap_or(("", ""));

        let mut summary = RouteSummary::default();
        let mut to_disconnect = Vec::new();

        for sub in self.table.snapshot() {
            if sub.kind != kind {
                continue;
            }
            // Agent-card events fan out to every open agent-events stream;
            // everything else honors direct addressing and sender exclusion.
            if kind != StreamKind::AgentEvents {
                if !to.is_empty() {
                    if sub.agent_id != to {
                        continue;
                    }
                } else if sub.agent_id == from {
                    continue;
                }
            }
            if !sub.filter.admits(event) {
                continue;
            }
            summary.matched += 1;
            match sub.buffer.push(event.clone()) {
                PushOutcome::Enqueued => summary.enqueued += 1,
                PushOutcome::Dropped => {
                    summary.dropped += 1;
                    counter!(
                        names::SUBSCRIPTION_DROPPED_TOTAL,
                        1,
                        "agent_id" => sub.agent_id.clone(),
                        "kind" => kind.as_str()
                    );
                    warn!(
                        subscription = %sub.id,
                        agent_id = %sub.agent_id,
                        "subscriber buffer full; event dropped"
                    );
                }
                PushOutcome::Disconnected => {
                    summary.disconnected += 1;
                    to_disconnect.push(sub.id.clone());
                }
            }
        }

        for id in to_disconnect {
            warn!(subscription = %id, "disconnecting slow subscriber");
            self.table.remove(&id);
        }

        Span::current().record("matched", summary.matched);
        Span::current().record("dropped", summary.dropped);
        debug!(
            event_id = %event.event_id,
            kind = kind.as_str(),
            matched = summary.matched,
            enqueued = summary.enqueued,
            "event routed"
        );
        summary
    }
}
