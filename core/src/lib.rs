// AgentHub Core Library
// A2A event broker core: task store, agent registry, routing, observability

pub mod config;
pub mod health;
pub mod json;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod tasks;
pub mod time;
pub mod trace; // W3C trace-context propagation over event metadata

// Export core types
pub use config::{BrokerConfig, CortexConfig, LlmConfig, WorkerConfig};
pub use health::{HealthState, MetricsHandle};
pub use registry::{AgentRegistry, RegisteredAgent};
pub use router::{
    DropPolicy, EventBuffer, EventRouter, PushOutcome, RouteSummary, StreamKind, Subscription,
    SubscriptionFilter, SubscriptionTable,
};
pub use tasks::{transition_allowed, TaskQuery, TaskStore};
pub use time::now_timestamp;

// Generated proto code
// Re-export proto types from the shared crate so paths `crate::proto::...` stay stable.
pub use agenthub_proto as proto;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, HubError>;

impl From<HubError> for tonic::Status {
    fn from(err: HubError) -> Self {
        match err {
            HubError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            HubError::NotFound(msg) => tonic::Status::not_found(msg),
            HubError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            HubError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            other => tonic::Status::internal(other.to_string()),
        }
    }
}
