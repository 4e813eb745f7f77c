use agenthub_broker::{HubService, HubState};
use agenthub_proto::agent_hub_server::AgentHub;
use agenthub_proto::{
    AgentCard, AgentSkill, RegisterAgentRequest, UnregisterAgentRequest,
};
use agenthub_core::BrokerConfig;
use tonic::{Code, Request};

fn service() -> HubService {
    HubService::new(HubState::new(&BrokerConfig::default()))
}

fn card(name: &str) -> AgentCard {
    AgentCard {
        protocol_version: "0.2".to_string(),
        name: name.to_string(),
        description: "test agent".to_string(),
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

#[tokio::test]
async fn register_agent_success() {
    let svc = service();
    let resp = svc
        .register_agent(Request::new(RegisterAgentRequest {
            card: Some(card("agent1")),
            subscription_tags: vec!["translate".to_string()],
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success);
    assert!(svc.state().registry.contains("agent1"));
}

#[tokio::test]
async fn register_agent_empty_name_is_invalid() {
    let svc = service();
    let err = svc
        .register_agent(Request::new(RegisterAgentRequest {
            card: Some(card("")),
            subscription_tags: vec![],
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn register_agent_missing_card_is_invalid() {
    let svc = service();
    let err = svc
        .register_agent(Request::new(RegisterAgentRequest {
            card: None,
            subscription_tags: vec![],
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn reregistration_is_idempotent_on_registry_contents() {
    let svc = service();
    for _ in 0..2 {
        let resp = svc
            .register_agent(Request::new(RegisterAgentRequest {
                card: Some(card("agent1")),
                subscription_tags: vec![],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.success);
    }
    assert_eq!(svc.state().registry.len(), 1);
    assert_eq!(
        svc.state().registry.by_skill_tag("translate"),
        vec!["agent1".to_string()]
    );
}

#[tokio::test]
async fn unregister_removes_agent() {
    let svc = service();
    svc.register_agent(Request::new(RegisterAgentRequest {
        card: Some(card("agent1")),
        subscription_tags: vec![],
    }))
    .await
    .unwrap();

    let resp = svc
        .unregister_agent(Request::new(UnregisterAgentRequest {
            agent_id: "agent1".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(resp.success);
    assert!(!svc.state().registry.contains("agent1"));

    let err = svc
        .unregister_agent(Request::new(UnregisterAgentRequest {
            agent_id: "agent1".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}
