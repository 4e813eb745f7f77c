use super::*;

use agenthub_proto::{agent_event, Part, Role};

#[tokio::test]
async fn broadcast_reaches_everyone_except_the_sender() {
    let (addr, _server, _svc) = start_test_server(BrokerConfig::default()).await;

    let agent_a = connect(addr, "a").await;
    let mut a_stream = agent_a.subscribe_messages(None).await.unwrap();
    let agent_b = connect(addr, "b").await;
    let mut b_stream = agent_b.subscribe_messages(None).await.unwrap();
    let agent_c = connect(addr, "c").await;
    let mut c_stream = agent_c.subscribe_messages(None).await.unwrap();

    let message = agent_a.new_message("ctx1", Role::User, vec![Part::text("to all")]);
    agent_a
        .publish_message(message, agent_a.routing("", "a2a.message"))
        .await
        .unwrap();

    for stream in [&mut b_stream, &mut c_stream] {
        let event = next_event(stream).await;
        let Some(agent_event::Payload::Message(received)) = event.payload else {
            panic!("expected message payload");
        };
        assert_eq!(received.text_content(), "to all");
    }

    // The sender never hears its own broadcast.
    expect_silence(&mut a_stream, Duration::from_millis(300)).await;
}
