use tracing_subscriber::EnvFilter;

use agenthub_broker::{start_server, HubState};
use agenthub_core::{health, BrokerConfig, HealthState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = BrokerConfig::from_env()?;
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    if config.health_port != 0 {
        let health_state = HealthState::new("agenthub-broker", env!("CARGO_PKG_VERSION"))?;
        health_state.set_check("event_router", true);
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, health_state).await {
                tracing::error!(error = %e, "health endpoint exited");
            }
        });
    }

    let state = HubState::new(&config);
    start_server(config.listen_addr, state).await.map_err(|e| e.into())
}
