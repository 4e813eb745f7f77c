use super::*;

use agenthub_proto::{agent_event, Part, Role};

#[tokio::test]
async fn direct_message_reaches_only_the_target_agent() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let agent_b = connect(addr, "agent_b").await;
    let mut b_stream = agent_b.subscribe_messages(None).await.unwrap();
    let agent_c = connect(addr, "agent_c").await;
    let mut c_stream = agent_c.subscribe_messages(None).await.unwrap();

    let agent_a = connect(addr, "agent_a").await;
    let message = {
        let mut m = agent_a.new_message("ctx1", Role::User, vec![Part::text("hi")]);
        m.message_id = "m1".to_string();
        m
    };
    agent_a
        .publish_message(message, agent_a.routing("agent_b", "a2a.message"))
        .await
        .unwrap();

    let event = next_event(&mut b_stream).await;
    let Some(agent_event::Payload::Message(received)) = event.payload else {
        panic!("expected message payload");
    };
    assert_eq!(received.message_id, "m1");
    assert_eq!(received.text_content(), "hi");
    let routing = event.routing.unwrap();
    assert_eq!(routing.from_agent_id, "agent_a");
    assert_eq!(routing.to_agent_id, "agent_b");

    // Nobody else sees a directly-addressed message.
    expect_silence(&mut c_stream, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn events_carry_trace_context() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let agent_b = connect(addr, "agent_b").await;
    let mut b_stream = agent_b.subscribe_messages(None).await.unwrap();

    let agent_a = connect(addr, "agent_a").await;
    let message = agent_a.new_message("ctx1", Role::User, vec![Part::text("traced")]);
    agent_a
        .publish_message(message, agent_a.routing("agent_b", "a2a.message"))
        .await
        .unwrap();

    let event = next_event(&mut b_stream).await;
    let trace = event.trace.expect("trace context attached");
    // The publisher's trace continues through the broker.
    assert_eq!(trace.trace_id, agent_a.trace().trace_id);
    assert_eq!(trace.span_id.len(), 16);
    assert!(trace.headers.contains_key("traceparent"));
}
