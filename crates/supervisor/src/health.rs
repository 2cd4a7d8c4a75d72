use agentmesh_core::config::SupervisorConfig;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::client::build_http_client;
use crate::registry::{normalize_url, AgentRecord, AgentRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentHealth {
    fn failed(name: &str, status: HealthStatus, error: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            response_time_ms: None,
            details: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub supervisor_status: String,
    pub agents: Vec<AgentHealth>,
    pub total_agents: usize,
    pub healthy_agents: usize,
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Probes every registered agent's health endpoint.
pub struct HealthAggregator {
    registry: Arc<AgentRegistry>,
    http: Client,
    timeout: Duration,
}

impl HealthAggregator {
    pub fn new(registry: Arc<AgentRegistry>, config: &SupervisorConfig) -> Self {
        Self::with_timeout(registry, Duration::from_secs(config.health_timeout_secs))
    }

    pub fn with_timeout(registry: Arc<AgentRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            http: build_http_client(timeout),
            timeout,
        }
    }

    /// Probe one agent. Never fails: every fault becomes a record.
    pub async fn check_one(&self, agent: &AgentRecord) -> AgentHealth {
        let url = normalize_url(&agent.health_endpoint());
        let started = Instant::now();

        let response = match tokio::time::timeout(self.timeout, self.http.get(&url).send()).await {
            Err(_) => {
                return AgentHealth::failed(&agent.name, HealthStatus::Timeout, "Request timed out".to_string())
            }
            Ok(Err(e)) if e.is_timeout() => {
                return AgentHealth::failed(&agent.name, HealthStatus::Timeout, "Request timed out".to_string())
            }
            Ok(Err(e)) => return AgentHealth::failed(&agent.name, HealthStatus::Error, e.to_string()),
            Ok(Ok(response)) => response,
        };

        let elapsed_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
        let status = response.status();
        if !status.is_success() {
            return AgentHealth {
                name: agent.name.clone(),
                status: HealthStatus::Unhealthy,
                response_time_ms: Some(elapsed_ms),
                details: None,
                error: Some(format!("HTTP {}", status.as_u16())),
            };
        }

        match response.json::<Value>().await {
            Ok(details) => AgentHealth {
                name: agent.name.clone(),
                status: HealthStatus::Healthy,
                response_time_ms: Some(elapsed_ms),
                details: Some(details),
                error: None,
            },
            Err(e) if e.is_timeout() => {
                AgentHealth::failed(&agent.name, HealthStatus::Timeout, "Request timed out".to_string())
            }
            Err(e) => AgentHealth::failed(&agent.name, HealthStatus::Error, e.to_string()),
        }
    }

    /// Probe every registered agent concurrently.
    pub async fn aggregate(self: &Arc<Self>) -> AggregateHealth {
        let agents = self.registry.get_all().await;

        let probes = agents.iter().map(|agent| {
            let this = Arc::clone(self);
            let probe_agent = agent.clone();
            let name = agent.name.clone();
            async move {
                match tokio::spawn(async move { this.check_one(&probe_agent).await }).await {
                    Ok(health) => health,
                    Err(e) => AgentHealth::failed(&name, HealthStatus::Error, format!("health probe aborted: {}", e)),
                }
            }
        });
        let results: Vec<AgentHealth> = join_all(probes).await;

        let healthy_agents = results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        debug!(total = agents.len(), healthy = healthy_agents, "Aggregate health computed");

        AggregateHealth {
            supervisor_status: "ok".to_string(),
            agents: results,
            total_agents: agents.len(),
            healthy_agents,
        }
    }
}

/// Background loop that runs [`HealthAggregator::aggregate`] on a fixed
/// interval and logs agents that are not healthy.
pub struct HealthMonitor {
    aggregator: Arc<HealthAggregator>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(aggregator: Arc<HealthAggregator>, interval: Duration) -> Self {
        Self { aggregator, interval }
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "HealthMonitor started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.aggregator.aggregate().await;
                    for agent in report.agents.iter().filter(|a| a.status != HealthStatus::Healthy) {
                        warn!(
                            agent = %agent.name,
                            status = ?agent.status,
                            error = agent.error.as_deref().unwrap_or(""),
                            "Agent not healthy"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("HealthMonitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisterRequest;
    use crate::test_support::{agent, closed_port, spawn_stub};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tempfile::TempDir;

    async fn up() -> Json<Value> {
        Json(json!({ "status": "up", "agent": "stub" }))
    }

    async fn down() -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    async fn slow() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Json(json!({ "status": "up" }))
    }

    fn aggregator(registry: Arc<AgentRegistry>) -> Arc<HealthAggregator> {
        Arc::new(HealthAggregator::with_timeout(registry, Duration::from_millis(500)))
    }

    async fn register(registry: &AgentRegistry, name: &str, base: &str) {
        registry
            .register(RegisterRequest {
                name: name.to_string(),
                base_url: base.to_string(),
                health_url: format!("{}/health", base),
                capabilities: vec![],
            })
            .await;
    }

    #[tokio::test]
    async fn test_check_one_statuses() {
        let base = spawn_stub(
            Router::new()
                .route("/health", get(up))
                .route("/down/health", get(down))
                .route("/slow/health", get(slow)),
        )
        .await;
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(AgentRegistry::open(&dir.path().join("registry.json")));
        let checker = aggregator(registry);

        let healthy = checker.check_one(&agent("a", &base, &[])).await;
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.details.unwrap()["status"], "up");
        let ms = healthy.response_time_ms.unwrap();
        assert_eq!(ms, (ms * 100.0).round() / 100.0);

        let unhealthy = checker.check_one(&agent("b", &format!("{}/down", base), &[])).await;
        assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
        assert_eq!(unhealthy.error.as_deref(), Some("HTTP 503"));
        assert!(unhealthy.response_time_ms.is_some());

        let timed_out = checker.check_one(&agent("c", &format!("{}/slow", base), &[])).await;
        assert_eq!(timed_out.status, HealthStatus::Timeout);
        assert_eq!(timed_out.error.as_deref(), Some("Request timed out"));
        assert_eq!(timed_out.response_time_ms, None);
    }

    #[tokio::test]
    async fn test_aggregate_isolates_refused_agent() {
        let base = spawn_stub(Router::new().route("/health", get(up))).await;
        let refused = closed_port().await;
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(AgentRegistry::open(&dir.path().join("registry.json")));
        register(&registry, "one", &base).await;
        register(&registry, "two", &base).await;
        register(&registry, "gone", &refused).await;

        let report = aggregator(registry).aggregate().await;
        assert_eq!(report.supervisor_status, "ok");
        assert_eq!(report.total_agents, 3);
        assert_eq!(report.healthy_agents, 2);

        let gone = report.agents.iter().find(|a| a.name == "gone").unwrap();
        assert_eq!(gone.status, HealthStatus::Error);
        assert!(gone.error.is_some());
        assert_eq!(gone.response_time_ms, None);

        let value = serde_json::to_value(gone).unwrap();
        assert!(value["response_time_ms"].is_null());
    }

    #[tokio::test]
    async fn test_aggregate_empty_registry() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(AgentRegistry::open(&dir.path().join("registry.json")));
        let report = aggregator(registry).aggregate().await;
        assert_eq!(report.total_agents, 0);
        assert_eq!(report.healthy_agents, 0);
        assert!(report.agents.is_empty());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(AgentRegistry::open(&dir.path().join("registry.json")));
        let monitor = Arc::new(HealthMonitor::new(aggregator(registry), Duration::from_millis(20)));
        let (tx, rx) = tokio::sync::broadcast::channel(1);

        let handle = tokio::spawn(monitor.run_loop(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
