use agenthub_client::{HandlerOutcome, HubClient, TaskWorker};
use agenthub_core::WorkerConfig;
use agenthub_proto::{Artifact, Part, Role, TaskState};
use tonic::transport::Channel;

fn lazy_client(agent_id: &str) -> HubClient {
    // connect_lazy performs no I/O; good enough for builder tests.
    let channel = Channel::from_static("http://127.0.0.1:1").connect_lazy();
    HubClient::from_channel(channel, agent_id)
}

#[tokio::test]
async fn new_message_stamps_unique_ids() {
    let client = lazy_client("agent_a");
    let m1 = client.new_message("ctx", Role::User, vec![Part::text("a")]);
    let m2 = client.new_message("ctx", Role::User, vec![Part::text("b")]);
    assert!(m1.message_id.starts_with("msg_"));
    assert_ne!(m1.message_id, m2.message_id);
    assert_eq!(m1.context_id, "ctx");
    assert_eq!(m1.role(), Role::User);
}

#[tokio::test]
async fn routing_fills_sender_identity() {
    let client = lazy_client("agent_a");
    let direct = client.routing("agent_b", "a2a.message");
    assert_eq!(direct.from_agent_id, "agent_a");
    assert_eq!(direct.to_agent_id, "agent_b");

    let broadcast = client.routing("", "a2a.message");
    assert!(broadcast.to_agent_id.is_empty());
}

#[tokio::test]
async fn client_trace_context_is_well_formed() {
    let client = lazy_client("agent_a");
    assert_eq!(client.trace().trace_id.len(), 32);
    assert_eq!(client.trace().span_id.len(), 16);
}

#[tokio::test]
async fn worker_without_handlers_refuses_to_run() {
    let worker = TaskWorker::from_config(lazy_client("agent_a"), &WorkerConfig::default());
    let err = worker.run().await.unwrap_err();
    assert!(err.to_string().contains("no task handlers"));
}

#[test]
fn handler_outcome_constructors() {
    let done = HandlerOutcome::completed(Artifact {
        artifact_id: "r1".to_string(),
        parts: vec![Part::text("ok")],
        ..Default::default()
    });
    assert_eq!(done.state, TaskState::Completed);
    assert!(done.artifact.is_some());
    assert!(done.error_message.is_none());

    let failed = HandlerOutcome::failed("boom");
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
}
