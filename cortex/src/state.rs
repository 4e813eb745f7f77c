//! Per-session conversation state behind a pluggable store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use prost_types::Timestamp;
use tokio::sync::Mutex;

use agenthub_core::now_timestamp;
use agenthub_proto::{Artifact, Message};

/// A task the orchestrator requested and is still waiting on.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub task_type: String,
    pub requested_at: Timestamp,
    /// The message that led to this task being requested.
    pub original_input: Message,
    pub user_notified: bool,
    /// Artifacts observed before the terminal status arrives.
    pub artifacts: Vec<Artifact>,
}

impl TaskContext {
    pub fn new(task_id: String, task_type: String, original_input: Message) -> Self {
        Self {
            task_id,
            task_type,
            requested_at: now_timestamp(),
            original_input,
            user_notified: false,
            artifacts: Vec::new(),
        }
    }
}

/// Everything the orchestrator knows about one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub pending_tasks: HashMap<String, TaskContext>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            pending_tasks: HashMap::new(),
        }
    }
}

/// Capability boundary over conversation-state storage.
///
/// The in-memory implementation is the one the core ships; persistent
/// backends substitute behind the same trait. `session` hands out the
/// per-session lock so callers serialize mutations on one conversation
/// without blocking any other.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<ConversationState>;
    async fn set(&self, session_id: &str, state: ConversationState);
    /// The lock handle for a session, creating empty state if unknown.
    async fn session(&self, session_id: &str) -> Arc<Mutex<ConversationState>>;
}

/// Sessions sharded in a concurrent map, one mutex per session.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Mutex<ConversationState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<ConversationState> {
        let handle = self.sessions.get(session_id).map(|e| Arc::clone(e.value()))?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    async fn set(&self, session_id: &str, state: ConversationState) {
        let handle = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(session_id))))
            .clone();
        *handle.lock().await = state;
    }

    async fn session(&self, session_id: &str) -> Arc<Mutex<ConversationState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(session_id))))
            .clone()
    }
}
