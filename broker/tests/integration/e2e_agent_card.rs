use super::*;

use agenthub_proto::{
    agent_event, AgentCard, AgentCardEventType, AgentSkill,
};

fn card(name: &str) -> AgentCard {
    AgentCard {
        protocol_version: "0.2".to_string(),
        name: name.to_string(),
        description: "integration test agent".to_string(),
        version: "1.0.0".to_string(),
        capabilities: None,
        skills: vec![AgentSkill {
            id: "echo".to_string(),
            name: "Echo".to_string(),
            tags: vec!["echo".to_string()],
            ..Default::default()
        }],
    }
}

#[tokio::test]
async fn card_subscribers_observe_registrations() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let watcher = connect(addr, "watcher").await;
    let mut card_stream = watcher.subscribe_agent_events().await.unwrap();

    let agent = connect(addr, "agent_echo").await;
    agent
        .register_agent(card("agent_echo"), vec!["echo".to_string()])
        .await
        .unwrap();

    let event = next_event(&mut card_stream).await;
    let Some(agent_event::Payload::AgentCard(card_event)) = event.payload else {
        panic!("expected agent card payload");
    };
    assert_eq!(card_event.r#type(), AgentCardEventType::Registered);
    let received = card_event.card.unwrap();
    assert_eq!(received, card("agent_echo"));

    // Re-registration is observed as an update.
    agent.register_agent(card("agent_echo"), vec![]).await.unwrap();
    let event = next_event(&mut card_stream).await;
    let Some(agent_event::Payload::AgentCard(card_event)) = event.payload else {
        panic!("expected agent card payload");
    };
    assert_eq!(card_event.r#type(), AgentCardEventType::Updated);
}
