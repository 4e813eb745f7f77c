//! Broker integration tests over an ephemeral localhost listener.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use agenthub_broker::{HubService, HubState};
use agenthub_client::HubClient;
use agenthub_proto::agent_hub_server::AgentHubServer;
use agenthub_proto::AgentEvent;
use agenthub_core::BrokerConfig;

/// Start a broker gRPC server on an ephemeral localhost port.
pub async fn start_test_server(
    config: BrokerConfig,
) -> (SocketAddr, tokio::task::JoinHandle<()>, HubService) {
    let svc = HubService::new(HubState::new(&config));
    let svc_for_return = svc.clone();

    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().unwrap();
    let incoming = TcpListenerStream::new(listener);

    let handle = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(AgentHubServer::new(svc))
            .serve_with_incoming(incoming)
            .await
            .expect("server exited cleanly");
    });

    (addr, handle, svc_for_return)
}

/// Connect a client library instance to the given test broker.
pub async fn connect(addr: SocketAddr, agent_id: &str) -> HubClient {
    HubClient::connect(format!("http://{addr}"), agent_id)
        .await
        .expect("connect client")
}

/// Next stream event, failing the test after two seconds of silence.
pub async fn next_event(stream: &mut tonic::Streaming<AgentEvent>) -> AgentEvent {
    tokio::time::timeout(Duration::from_secs(2), stream.message())
        .await
        .expect("timely event")
        .expect("stream healthy")
        .expect("stream open")
}

/// Assert no event arrives on the stream within the window.
pub async fn expect_silence(stream: &mut tonic::Streaming<AgentEvent>, window: Duration) {
    match tokio::time::timeout(window, stream.message()).await {
        Err(_) => {}
        Ok(Ok(None)) => {}
        Ok(Ok(Some(event))) => panic!("unexpected event delivered: {}", event.event_id),
        Ok(Err(status)) => panic!("stream error: {status}"),
    }
}

mod e2e_agent_card;
mod e2e_broadcast;
mod e2e_delegation;
mod e2e_direct_message;
mod e2e_slow_subscriber;
mod e2e_task_lifecycle;
