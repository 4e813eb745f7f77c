use super::*;

use agenthub_broker::{HubService, HubState};
use agenthub_proto::agent_hub_server::AgentHub;
use agenthub_proto::{
    agent_event, AgentEventMetadata, Message, Part, Priority, PublishMessageRequest, Role,
    SubscribeToMessagesRequest,
};
use tokio_stream::StreamExt;
use tonic::Request;

// Exercised in-process: the server stream only drains the subscription
// buffer when polled, so an unpolled stream is a genuinely paused consumer
// with no transport-level buffering in between.
#[tokio::test]
async fn paused_subscriber_keeps_fifo_prefix_and_drop_accounting() {
    let config = BrokerConfig {
        buffer_capacity: 4,
        ..Default::default()
    };
    let svc = HubService::new(HubState::new(&config));

    let mut stream = svc
        .subscribe_to_messages(Request::new(SubscribeToMessagesRequest {
            agent_id: "slow_agent".to_string(),
            context_pattern: String::new(),
        }))
        .await
        .unwrap()
        .into_inner();

    // 10 rapid publishes against a consumer that is not reading.
    for n in 0..10 {
        svc.publish_message(Request::new(PublishMessageRequest {
            message: Some(Message {
                message_id: format!("m{n}"),
                context_id: "ctx".to_string(),
                task_id: String::new(),
                role: Role::User as i32,
                content: vec![Part::text(format!("payload {n}"))],
                metadata: Default::default(),
                extensions: vec![],
            }),
            routing: Some(AgentEventMetadata {
                from_agent_id: "publisher".to_string(),
                to_agent_id: "slow_agent".to_string(),
                event_type: "a2a.message".to_string(),
                priority: Priority::Medium as i32,
                subscription_tags: vec![],
            }),
        }))
        .await
        .unwrap();
    }

    let sub = {
        let subs = svc.state().subscriptions.snapshot();
        assert_eq!(subs.len(), 1);
        std::sync::Arc::clone(&subs[0])
    };
    assert_eq!(sub.buffer.delivered_total(), 4);
    assert_eq!(sub.buffer.dropped_total(), 6);

    // Resume: the first four publishes arrive, in publish order.
    for n in 0..4 {
        let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timely event")
            .expect("stream open")
            .expect("stream healthy");
        let Some(agent_event::Payload::Message(received)) = event.payload else {
            panic!("expected message payload");
        };
        assert_eq!(received.message_id, format!("m{n}"));
    }

    // Closing the stream removes the subscription from the table.
    drop(stream);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(svc.state().subscriptions.is_empty());
}
