use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use agenthub_client::HubClient;
use agenthub_core::{health, CortexConfig, HealthState};
use agenthub_cortex::{
    Action, Cortex, Decision, DecisionEngine, HubPublisher, InMemorySessionStore, LlmEngine,
    RuleEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = CortexConfig::from_env()?;
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    if config.health_port != 0 {
        let health_state = HealthState::new("agenthub-cortex", env!("CARGO_PKG_VERSION"))?;
        health_state.set_check("decision_engine", true);
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, health_state).await {
                tracing::error!(error = %e, "health endpoint exited");
            }
        });
    }

    let engine: Arc<dyn DecisionEngine> = match config.llm.clone() {
        Some(llm) => {
            tracing::info!(model = %llm.model, "using remote decision engine");
            Arc::new(LlmEngine::new(llm)?)
        }
        None => {
            tracing::warn!("AGENTHUB_LLM_URL not set; using echo rule engine");
            Arc::new(RuleEngine::new(|_, _, trigger| Decision {
                reasoning: "no model configured; echoing".to_string(),
                actions: vec![Action::ChatResponse {
                    text: format!("received: {}", trigger.message.text_content()),
                }],
            }))
        }
    };

    let client = HubClient::connect(config.broker_url.clone(), "cortex").await?;
    client.register_agent(Cortex::agent_card(), vec![]).await?;

    let cortex = Arc::new(Cortex::new(
        &config,
        Arc::new(InMemorySessionStore::new()),
        engine,
        Arc::new(HubPublisher::new(client.clone())),
    ));

    cortex.run(&client).await?;
    Ok(())
}
