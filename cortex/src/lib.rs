// AgentHub Cortex - orchestrator runtime
// Session state, pending-task correlation, and decision-engine binding

pub mod engine;
pub mod llm;
pub mod processor;
pub mod state;

pub use engine::{Action, Decision, DecisionEngine, RuleEngine, Trigger, TriggerKind};
pub use llm::LlmEngine;
pub use processor::{Cortex, HubPublisher, OutboundPublisher};
pub use state::{ConversationState, InMemorySessionStore, SessionStore, TaskContext};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CortexError {
    #[error("decision engine error: {0}")]
    Engine(String),

    #[error("decision timed out after {0:?}")]
    DecisionTimeout(std::time::Duration),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("client error: {0}")]
    Client(#[from] agenthub_client::ClientError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CortexError>;
