//! Full delegation flow: user -> cortex -> worker -> cortex -> user.

use super::*;

use std::sync::Arc;

use async_trait::async_trait;

use agenthub_client::{HandlerOutcome, TaskHandler, TaskWorker};
use agenthub_proto::{
    agent_event, AgentCard, AgentSkill, Artifact, Message, Part, Role, Task,
};
use agenthub_core::CortexConfig;
use agenthub_cortex::{
    Action, Cortex, Decision, HubPublisher, InMemorySessionStore, RuleEngine, TriggerKind,
};

struct TranslateHandler;

#[async_trait]
impl TaskHandler for TranslateHandler {
    async fn handle(&self, _task: Task, _update: Message) -> HandlerOutcome {
        HandlerOutcome::completed(Artifact {
            artifact_id: "r1".to_string(),
            name: "translation".to_string(),
            description: String::new(),
            parts: vec![Part::text("Y")],
            metadata: Default::default(),
        })
    }
}

fn translator_card() -> AgentCard {
    AgentCard {
        protocol_version: "0.2".to_string(),
        name: "agent_translator".to_string(),
        description: "translates text".to_string(),
        version: "1.0.0".to_string(),
        capabilities: None,
        skills: vec![AgentSkill {
            id: "translate".to_string(),
            name: "Translate".to_string(),
            tags: vec!["translate".to_string()],
            ..Default::default()
        }],
    }
}

fn delegation_engine() -> RuleEngine {
    RuleEngine::new(|_history, agents, trigger| match trigger.kind {
        TriggerKind::ChatRequest => {
            let target = agents
                .iter()
                .find(|card| {
                    card.skills
                        .iter()
                        .any(|s| s.tags.iter().any(|t| t == "translate"))
                })
                .map(|card| card.name.clone())
                .unwrap_or_default();
            Decision {
                reasoning: "delegating to translator".to_string(),
                actions: vec![Action::TaskRequest {
                    task_type: "translate".to_string(),
                    payload: serde_json::json!({"text": trigger.message.text_content()}),
                    target_agent: target,
                    correlation_id: String::new(),
                }],
            }
        }
        TriggerKind::TaskResult => {
            let result = trigger
                .artifacts
                .iter()
                .flat_map(|a| a.parts.iter())
                .filter_map(|p| p.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            Decision {
                reasoning: "task finished".to_string(),
                actions: vec![Action::ChatResponse {
                    text: format!("Translation result: {result}"),
                }],
            }
        }
        _ => Decision::default(),
    })
}

#[tokio::test]
async fn user_request_is_delegated_and_answered() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    // Orchestrator comes up first so it observes the translator's card.
    let cortex_client = connect(addr, "cortex").await;
    cortex_client
        .register_agent(Cortex::agent_card(), vec![])
        .await
        .unwrap();
    let cortex = Arc::new(Cortex::new(
        &CortexConfig::default(),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(delegation_engine()),
        Arc::new(HubPublisher::new(cortex_client.clone())),
    ));
    let run_client = cortex_client.clone();
    tokio::spawn(async move {
        let _ = cortex.run(&run_client).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Worker registers its card and starts its task loop.
    let worker_client = connect(addr, "agent_translator").await;
    worker_client
        .register_agent(translator_card(), vec!["translate".to_string()])
        .await
        .unwrap();
    let worker = TaskWorker::new(worker_client, 4);
    worker.register_handler("translate", Arc::new(TranslateHandler));
    tokio::spawn(async move {
        let _ = worker.run().await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The user asks for a translation and waits for the answer.
    let user = connect(addr, "user_cli").await;
    let mut user_stream = user.subscribe_messages(None).await.unwrap();

    let mut request = user.new_message("S", Role::User, vec![Part::text("translate X")]);
    request
        .metadata
        .insert("task_type".to_string(), "chat_request".to_string());
    user.publish_message(request, user.routing("", "a2a.message"))
        .await
        .unwrap();

    let answer = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = user_stream
                .message()
                .await
                .expect("stream healthy")
                .expect("stream open");
            if let Some(agent_event::Payload::Message(message)) = event.payload {
                if message.role() == Role::Agent
                    && message.text_content().contains("Translation result")
                {
                    return message;
                }
            }
        }
    })
    .await
    .expect("timely answer");

    assert_eq!(answer.context_id, "S");
    assert!(answer.text_content().contains("Y"));

    // The task reached a terminal state at the broker with its artifact.
    let tasks = user
        .list_tasks(agenthub_proto::ListTasksRequest {
            agent_id: String::new(),
            context_id: "S".to_string(),
            states: vec![agenthub_proto::TaskState::Completed as i32],
            since: None,
            limit: 0,
        })
        .await
        .unwrap()
        .tasks;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].artifacts.len(), 1);
    assert_eq!(tasks[0].artifacts[0].parts[0].as_text(), Some("Y"));
}
