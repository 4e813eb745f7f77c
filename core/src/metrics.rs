//! Stable metric names exposed on the Prometheus endpoint.

pub mod names {
    pub const MESSAGES_PROCESSED_TOTAL: &str = "messages_processed_total";
    pub const MESSAGES_PUBLISHED_TOTAL: &str = "messages_published_total";
    pub const MESSAGE_PROCESSING_DURATION_SECONDS: &str = "message_processing_duration_seconds";
    pub const TASK_STATE_TRANSITIONS_TOTAL: &str = "task_state_transitions_total";
    pub const SUBSCRIPTION_DROPPED_TOTAL: &str = "subscription_dropped_total";
    pub const AGENT_CONNECTIONS_TOTAL: &str = "agent_connections_total";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "subscriptions_active";
}
