//! The decision-engine capability boundary.
//!
//! The orchestrator is polymorphic over one operation: given the
//! conversation so far, the registered agents, and the triggering event,
//! produce a set of outbound actions. Engines must not mutate orchestrator
//! state; `agents` is a snapshot.

use async_trait::async_trait;

use agenthub_proto::{AgentCard, Artifact, Message};

use crate::Result;

#[cfg(test)]
use mockall::automock;

/// How the orchestrator classified the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    ChatRequest,
    ChatResponse,
    TaskResult,
    Other,
}

impl TriggerKind {
    /// Classification from the `task_type` metadata field of a message.
    pub fn from_metadata(value: Option<&str>) -> Self {
        match value {
            Some("chat_request") => TriggerKind::ChatRequest,
            Some("chat_response") => TriggerKind::ChatResponse,
            Some("task_result") => TriggerKind::TaskResult,
            _ => TriggerKind::Other,
        }
    }
}

/// The event that woke the orchestrator, with any correlated task output.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub message: Message,
    /// Artifacts of the resolved task, for `TaskResult` triggers.
    pub artifacts: Vec<Artifact>,
}

/// One outbound action decided by the engine.
#[derive(Debug, Clone)]
pub enum Action {
    ChatResponse {
        text: String,
    },
    TaskRequest {
        task_type: String,
        payload: serde_json::Value,
        /// Empty means broadcast.
        target_agent: String,
        /// Pre-allocated task id; empty means the orchestrator assigns one.
        correlation_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub reasoning: String,
    pub actions: Vec<Action>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(
        &self,
        history: Vec<Message>,
        agents: Vec<AgentCard>,
        trigger: Trigger,
    ) -> Result<Decision>;
}

type RuleFn = dyn Fn(&[Message], &[AgentCard], &Trigger) -> Decision + Send + Sync;

/// Deterministic engine driven by a rule closure. The test double of choice;
/// also usable as a no-LLM fallback in deployments.
pub struct RuleEngine {
    rule: Box<RuleFn>,
}

impl RuleEngine {
    pub fn new(
        rule: impl Fn(&[Message], &[AgentCard], &Trigger) -> Decision + Send + Sync + 'static,
    ) -> Self {
        Self {
            rule: Box::new(rule),
        }
    }

    /// Engine that answers every trigger with a fixed chat response.
    pub fn canned(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_, _, _| Decision {
            reasoning: "canned response".to_string(),
            actions: vec![Action::ChatResponse { text: text.clone() }],
        })
    }
}

#[async_trait]
impl DecisionEngine for RuleEngine {
    async fn decide(
        &self,
        history: Vec<Message>,
        agents: Vec<AgentCard>,
        trigger: Trigger,
    ) -> Result<Decision> {
        Ok((self.rule)(&history, &agents, &trigger))
    }
}
