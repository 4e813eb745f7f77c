// Environment-driven configuration for broker, orchestrator and workers
use std::net::SocketAddr;
use std::time::Duration;

use crate::router::DropPolicy;
use crate::{HubError, Result};

pub const DEFAULT_BROKER_ADDR: &str = "0.0.0.0:50051";
pub const DEFAULT_BROKER_URL: &str = "http://127.0.0.1:50051";
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;
pub const DEFAULT_DECISION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WORKER_CAP: usize = 8;
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| HubError::Config(format!("invalid value for {name}: {raw}"))),
        None => Ok(default),
    }
}

/// Broker process configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub listen_addr: SocketAddr,
    pub buffer_capacity: usize,
    pub drop_policy: DropPolicy,
    pub health_port: u16,
    pub log_filter: String,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env_var("AGENTHUB_BROKER_ADDR")
            .unwrap_or_else(|| DEFAULT_BROKER_ADDR.into())
            .parse()
            .map_err(|e| HubError::Config(format!("invalid AGENTHUB_BROKER_ADDR: {e}")))?;
        Ok(Self {
            listen_addr,
            buffer_capacity: parse_env("AGENTHUB_BUFFER_CAPACITY", DEFAULT_BUFFER_CAPACITY)?,
            drop_policy: parse_env("AGENTHUB_DROP_POLICY", DropPolicy::default())?,
            health_port: parse_env("AGENTHUB_HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            log_filter: env_var("AGENTHUB_LOG").unwrap_or_else(|| "info".into()),
        })
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_BROKER_ADDR.parse().unwrap_or_else(|_| {
                SocketAddr::from(([0, 0, 0, 0], 50051))
            }),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            drop_policy: DropPolicy::default(),
            health_port: DEFAULT_HEALTH_PORT,
            log_filter: "info".into(),
        }
    }
}

/// Remote decision-engine endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl LlmConfig {
    /// Present only when `AGENTHUB_LLM_URL` is set.
    pub fn from_env() -> Option<Self> {
        let url = env_var("AGENTHUB_LLM_URL")?;
        Some(Self {
            url,
            model: env_var("AGENTHUB_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            api_key: env_var("AGENTHUB_LLM_API_KEY"),
        })
    }
}

/// Orchestrator process configuration.
#[derive(Debug, Clone)]
pub struct CortexConfig {
    pub broker_url: String,
    pub decision_timeout: Duration,
    pub worker_cap: usize,
    pub health_port: u16,
    pub log_filter: String,
    pub llm: Option<LlmConfig>,
}

impl CortexConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker_url: env_var("AGENTHUB_BROKER_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.into()),
            decision_timeout: Duration::from_secs(parse_env(
                "AGENTHUB_DECISION_TIMEOUT_SECS",
                DEFAULT_DECISION_TIMEOUT_SECS,
            )?),
            worker_cap: parse_env("AGENTHUB_WORKER_CAP", DEFAULT_WORKER_CAP)?,
            health_port: parse_env("AGENTHUB_HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            log_filter: env_var("AGENTHUB_LOG").unwrap_or_else(|| "info".into()),
            llm: LlmConfig::from_env(),
        })
    }
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.into(),
            decision_timeout: Duration::from_secs(DEFAULT_DECISION_TIMEOUT_SECS),
            worker_cap: DEFAULT_WORKER_CAP,
            health_port: DEFAULT_HEALTH_PORT,
            log_filter: "info".into(),
            llm: None,
        }
    }
}

/// Task-worker (client library) configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub broker_url: String,
    pub worker_cap: usize,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker_url: env_var("AGENTHUB_BROKER_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.into()),
            worker_cap: parse_env("AGENTHUB_WORKER_CAP", DEFAULT_WORKER_CAP)?,
        })
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.into(),
            worker_cap: DEFAULT_WORKER_CAP,
        }
    }
}
