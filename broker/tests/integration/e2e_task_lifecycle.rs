use super::*;

use agenthub_proto::{agent_event, Artifact, Part, Role, TaskState};

#[tokio::test]
async fn task_events_stream_to_the_assigned_worker() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let worker = connect(addr, "agent_worker").await;
    let mut task_stream = worker
        .subscribe_tasks(vec![], vec![TaskState::Submitted])
        .await
        .unwrap();

    let requester = connect(addr, "agent_requester").await;
    let mut update = requester.new_message("ctx1", Role::User, vec![Part::text("process X")]);
    update.task_id = "T".to_string();
    requester
        .publish_task_state(
            "T",
            "ctx1",
            TaskState::Submitted,
            update,
            requester.routing("agent_worker", "a2a.task.update"),
        )
        .await
        .unwrap();

    let event = next_event(&mut task_stream).await;
    let Some(agent_event::Payload::StatusUpdate(status_update)) = event.payload else {
        panic!("expected task status payload");
    };
    assert_eq!(status_update.task_id, "T");
    assert_eq!(
        status_update.status.unwrap().state(),
        TaskState::Submitted
    );
}

#[tokio::test]
async fn full_lifecycle_is_observable_via_get_task() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let requester = connect(addr, "agent_requester").await;
    let worker = connect(addr, "agent_worker").await;

    let mut submit = requester.new_message("ctx1", Role::User, vec![Part::text("process X")]);
    submit.task_id = "T".to_string();
    requester
        .publish_task_state(
            "T",
            "ctx1",
            TaskState::Submitted,
            submit,
            requester.routing("agent_worker", "a2a.task.update"),
        )
        .await
        .unwrap();

    let mut working = worker.new_message("ctx1", Role::Agent, vec![Part::text("working")]);
    working.task_id = "T".to_string();
    worker
        .publish_task_state(
            "T",
            "ctx1",
            TaskState::Working,
            working,
            worker.routing("", "a2a.task.update"),
        )
        .await
        .unwrap();

    worker
        .publish_task_artifact(
            "T",
            Artifact {
                artifact_id: "r1".to_string(),
                name: "result".to_string(),
                description: String::new(),
                parts: vec![Part::text("done")],
                metadata: Default::default(),
            },
            worker.routing("", "a2a.task.artifact"),
        )
        .await
        .unwrap();

    let mut completed = worker.new_message("ctx1", Role::Agent, vec![Part::text("ok")]);
    completed.task_id = "T".to_string();
    worker
        .publish_task_state(
            "T",
            "ctx1",
            TaskState::Completed,
            completed,
            worker.routing("", "a2a.task.update"),
        )
        .await
        .unwrap();

    let task = requester.get_task("T", 0).await.unwrap();
    assert_eq!(task.status.as_ref().unwrap().state(), TaskState::Completed);
    assert_eq!(task.history.len(), 3);
    assert_eq!(task.artifacts.len(), 1);
    assert_eq!(task.artifacts[0].artifact_id, "r1");
}

#[tokio::test]
async fn published_message_appears_in_task_history_verbatim() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let requester = connect(addr, "agent_requester").await;
    let mut submit = requester.new_message("ctx1", Role::User, vec![Part::text("start")]);
    submit.task_id = "T".to_string();
    requester
        .publish_task_state(
            "T",
            "ctx1",
            TaskState::Submitted,
            submit,
            requester.routing("", "a2a.task.update"),
        )
        .await
        .unwrap();

    // A plain message that references the task joins its history.
    let mut original = requester.new_message("ctx1", Role::User, vec![Part::text("round trip")]);
    original.task_id = "T".to_string();
    original
        .metadata
        .insert("source".to_string(), "cli".to_string());
    requester
        .publish_message(original.clone(), requester.routing("", "a2a.message"))
        .await
        .unwrap();

    let task = requester.get_task("T", 0).await.unwrap();
    let stored: Vec<_> = task
        .history
        .iter()
        .filter(|m| m.message_id == original.message_id)
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], &original);
}
