// HTTP health/readiness/metrics surface
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use tracing::info;

use crate::{HubError, Result};

pub type MetricsHandle = PrometheusHandle;

static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install (or reuse) the process-global Prometheus recorder.
///
/// The recorder can only be installed once per process; repeated callers
/// (broker + orchestrator in one test binary) share the same handle.
pub fn metrics_handle() -> Result<MetricsHandle> {
    if let Some(handle) = RECORDER.get() {
        return Ok(handle.clone());
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = RECORDER.set(handle.clone());
            Ok(handle)
        }
        // Lost the install race; the winner's handle is in the cell.
        Err(err) => RECORDER
            .get()
            .cloned()
            .ok_or_else(|| HubError::Internal(format!("failed to install metrics recorder: {err}"))),
    }
}

/// Shared state behind `/health`, `/ready` and `/metrics`.
#[derive(Clone)]
pub struct HealthState {
    service: &'static str,
    version: &'static str,
    started: Instant,
    checks: Arc<DashMap<String, bool>>,
    metrics: MetricsHandle,
}

impl HealthState {
    pub fn new(service: &'static str, version: &'static str) -> Result<Self> {
        Ok(Self {
            service,
            version,
            started: Instant::now(),
            checks: Arc::new(DashMap::new()),
            metrics: metrics_handle()?,
        })
    }

    /// Record the outcome of a named health check.
    pub fn set_check(&self, name: &str, healthy: bool) {
        self.checks.insert(name.to_string(), healthy);
    }

    /// All registered checks pass (an empty check set is healthy).
    pub fn healthy(&self) -> bool {
        self.checks.iter().all(|entry| *entry.value())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[derive(Serialize)]
struct CheckEntry {
    name: String,
    healthy: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    uptime: u64,
    checks: Vec<CheckEntry>,
}

fn health_response(state: &HealthState) -> (StatusCode, Json<HealthResponse>) {
    let healthy = state.healthy();
    let mut checks: Vec<CheckEntry> = state
        .checks
        .iter()
        .map(|entry| CheckEntry {
            name: entry.key().clone(),
            healthy: *entry.value(),
        })
        .collect();
    checks.sort_by(|a, b| a.name.cmp(&b.name));
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" },
            service: state.service,
            version: state.version,
            uptime: state.uptime_seconds(),
            checks,
        }),
    )
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    health_response(&state)
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    health_response(&state)
}

async fn metrics(State(state): State<HealthState>) -> impl IntoResponse {
    state.metrics.render()
}

pub fn build_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the health surface on the given port. A port of 0 after config
/// parsing means the caller opted out and should not invoke this.
pub async fn serve(port: u16, state: HealthState) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, service = state.service, "health endpoint listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(HubError::IoError)
}
