use agentmesh_core::{Config, Paths};
use agentmesh_supervisor::{AgentRegistry, Dispatcher, HealthAggregator, HealthMonitor, RegisterRequest, RouteOutcome};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::http::{parse_json, serve_until_ctrl_c, with_http_layers, ApiError};

#[derive(Clone)]
pub struct SupervisorState {
    registry: Arc<AgentRegistry>,
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthAggregator>,
    started: Instant,
}

impl SupervisorState {
    pub fn new(registry: Arc<AgentRegistry>, dispatcher: Arc<Dispatcher>, health: Arc<HealthAggregator>) -> Self {
        Self {
            registry,
            dispatcher,
            health,
            started: Instant::now(),
        }
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    prompt: String,
    #[serde(default = "default_user")]
    user_id: String,
}

fn default_user() -> String {
    "anonymous".to_string()
}

async fn handle_health(State(state): State<SupervisorState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "agents": state.registry.len().await,
        "uptime_secs": state.started.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_registry(State(state): State<SupervisorState>) -> impl IntoResponse {
    let agents = state.registry.get_all().await;
    Json(serde_json::json!({
        "total": agents.len(),
        "agents": agents,
    }))
}

async fn handle_register(
    State(state): State<SupervisorState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: RegisterRequest = parse_json(&body, "registration")?;
    let name = request.name.clone();

    if !state.registry.register(request).await {
        warn!(agent = %name, "Registration failed");
        return Err(ApiError::bad_request("Registration failed"));
    }

    info!(agent = %name, "Agent registered");
    Ok(Json(serde_json::json!({
        "status": "registered",
        "agent": name,
    }))
    .into_response())
}

async fn handle_query(
    State(state): State<SupervisorState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: QueryRequest = parse_json(&body, "query")?;
    if req.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }

    let outcome = state.dispatcher.route(&req.prompt, &req.user_id).await;
    let status = match &outcome {
        RouteOutcome::NoAgent { .. } => StatusCode::NOT_FOUND,
        RouteOutcome::Failed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };

    let mut payload = serde_json::to_value(&outcome).map_err(|e| ApiError::internal(e.to_string()))?;
    if let Value::Object(map) = &mut payload {
        map.insert("timestamp".to_string(), Value::String(agentmesh_core::iso_now()));
    }
    Ok((status, Json(payload)).into_response())
}

async fn handle_health_aggregate(State(state): State<SupervisorState>) -> impl IntoResponse {
    Json(state.health.aggregate().await)
}

pub fn build_router(state: SupervisorState) -> Router {
    let router = Router::new()
        .route("/health", get(handle_health))
        .route("/health/aggregate", get(handle_health_aggregate))
        .route("/registry", get(handle_registry))
        .route("/register", post(handle_register))
        .route("/query", post(handle_query));
    with_http_layers(router).with_state(state)
}

pub async fn run(paths: &Paths, config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut supervisor = config.supervisor.clone();
    if let Some(host) = host {
        supervisor.host = host;
    }
    if let Some(port) = port {
        supervisor.port = port;
    }

    let registry_path = paths.resolve(&supervisor.registry_path);
    let registry = Arc::new(AgentRegistry::open(&registry_path));
    info!(
        path = %registry_path.display(),
        agents = registry.len().await,
        "Agent registry loaded"
    );

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), &supervisor));
    let health = Arc::new(HealthAggregator::new(Arc::clone(&registry), &supervisor));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let monitor_handle = if supervisor.health_interval_secs > 0 {
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&health),
            Duration::from_secs(supervisor.health_interval_secs),
        ));
        Some(tokio::spawn(monitor.run_loop(shutdown_tx.subscribe())))
    } else {
        None
    };

    let app = build_router(SupervisorState::new(Arc::clone(&registry), dispatcher, health));
    let bind_addr = format!("{}:{}", supervisor.host, supervisor.port);
    info!(addr = %bind_addr, base_url = %supervisor.base_url(), "Starting supervisor");

    serve_until_ctrl_c(app, &bind_addr, shutdown_tx).await?;

    if let Some(handle) = monitor_handle {
        let _ = handle.await;
    }
    if let Err(e) = registry.save().await {
        warn!(error = %e, "Failed to save registry on shutdown");
    }
    info!("Supervisor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::spawn_app;
    use agentmesh_core::config::SupervisorConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn spawn_supervisor(dir: &TempDir) -> (String, Arc<AgentRegistry>) {
        let registry = Arc::new(AgentRegistry::open(&dir.path().join("registry.json")));
        let config = SupervisorConfig {
            task_timeout_secs: 2,
            health_timeout_secs: 1,
            ..SupervisorConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), &config));
        let health = Arc::new(HealthAggregator::new(Arc::clone(&registry), &config));
        let base = spawn_app(build_router(SupervisorState::new(Arc::clone(&registry), dispatcher, health))).await;
        (base, registry)
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let dir = TempDir::new().unwrap();
        let (base, registry) = spawn_supervisor(&dir).await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{}/register", base))
            .json(&json!({
                "name": "EnergyWorker",
                "base_url": "localhost:8001",
                "capabilities": ["cost_estimation"],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "registered");
        assert_eq!(body["agent"], "EnergyWorker");
        assert_eq!(registry.len().await, 1);

        let body: Value = http
            .get(format!("{}/registry", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total"], 1);
        assert_eq!(body["agents"][0]["base_url"], "http://localhost:8001");
    }

    #[tokio::test]
    async fn test_register_rejects_bad_payload() {
        let dir = TempDir::new().unwrap();
        let (base, _) = spawn_supervisor(&dir).await;
        let http = reqwest::Client::new();

        let resp = http
            .post(format!("{}/register", base))
            .json(&json!({ "name": "", "base_url": "localhost:8001" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Registration failed");

        let resp = http
            .post(format!("{}/register", base))
            .json(&json!({ "capabilities": [] }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let dir = TempDir::new().unwrap();
        let (base, _) = spawn_supervisor(&dir).await;
        let http = reqwest::Client::new();

        for path in ["/register", "/query"] {
            let resp = http
                .post(format!("{}{}", base, path))
                .header("content-type", "application/json")
                .body("{not json")
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
            let err: Value = resp.json().await.unwrap();
            assert_eq!(err["kind"], "validation");
            assert!(err["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_query_without_agent_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (base, _) = spawn_supervisor(&dir).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/query", base))
            .json(&json!({ "prompt": "what is the energy cost for Building-A", "user_id": "u1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
        assert!(body["suggestions"].as_array().unwrap().len() > 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let dir = TempDir::new().unwrap();
        let (base, _) = spawn_supervisor(&dir).await;
        let http = reqwest::Client::new();

        let body: Value = http.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["agents"], 0);

        let body: Value = http
            .get(format!("{}/health/aggregate", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["supervisor_status"], "ok");
        assert_eq!(body["total_agents"], 0);
        assert_eq!(body["healthy_agents"], 0);
    }
}
