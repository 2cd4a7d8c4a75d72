use agentmesh_core::{Config, Paths, TaskMessage};
use agentmesh_storage::Ltm;
use agentmesh_worker::{register_with_supervisor, EnergyExecutor, LtmCompactor, TaskHandler};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::http::{parse_json, serve_until_ctrl_c, with_http_layers, ApiError};

#[derive(Clone)]
pub struct WorkerState {
    handler: Arc<TaskHandler>,
    started: Instant,
}

impl WorkerState {
    pub fn new(handler: Arc<TaskHandler>) -> Self {
        Self {
            handler,
            started: Instant::now(),
        }
    }
}

fn parse_assignment(body: &[u8]) -> Result<TaskMessage, ApiError> {
    let mut assignment: TaskMessage = parse_json(body, "task assignment")?;
    assignment.ensure_message_id();
    Ok(assignment)
}

async fn handle_health(State(state): State<WorkerState>) -> impl IntoResponse {
    let ltm = state.handler.ltm().map(|ltm| ltm.backend_kind().as_str());
    Json(serde_json::json!({
        "status": "up",
        "agent": state.handler.name(),
        "ltm": ltm,
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}

async fn handle_capabilities(State(state): State<WorkerState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "capabilities": state.handler.capabilities(),
    }))
}

async fn handle_task(
    State(state): State<WorkerState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let assignment = parse_assignment(&body)?;
    Ok(Json(state.handler.accept(assignment)))
}

async fn handle_task_sync(
    State(state): State<WorkerState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let assignment = parse_assignment(&body)?;
    let handler = Arc::clone(&state.handler);
    let report = tokio::task::spawn_blocking(move || handler.handle(&assignment))
        .await
        .map_err(|e| ApiError::internal(format!("Task execution aborted: {}", e)))?;
    Ok(Json(report))
}

pub fn build_router(state: WorkerState) -> Router {
    let router = Router::new()
        .route("/health", get(handle_health))
        .route("/capabilities", get(handle_capabilities))
        .route("/task", post(handle_task))
        .route("/task/sync", post(handle_task_sync));
    with_http_layers(router).with_state(state)
}

pub async fn run(paths: &Paths, config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut worker = config.worker.clone();
    if let Some(host) = host {
        worker.host = host;
    }
    if let Some(port) = port {
        worker.port = port;
    }

    let ltm_path = paths.resolve(&config.ltm.path);
    let ltm = Arc::new(Ltm::open(&config.ltm, &ltm_path));
    info!(
        backend = ltm.backend_kind().as_str(),
        path = %ltm.path().display(),
        ttl_days = config.ltm.ttl_days,
        "LTM ready"
    );

    let executor = Arc::new(EnergyExecutor::new());
    let handler = Arc::new(TaskHandler::new(&worker.name, executor, Some(Arc::clone(&ltm))));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let compactor_handle = if config.ltm.compact_interval_secs > 0 {
        let compactor = Arc::new(LtmCompactor::new(
            Arc::clone(&ltm),
            Duration::from_secs(config.ltm.compact_interval_secs),
        ));
        Some(tokio::spawn(compactor.run_loop(shutdown_tx.subscribe())))
    } else {
        None
    };

    if worker.auto_register {
        let registration = worker.clone();
        let capabilities = handler.capabilities();
        tokio::spawn(async move {
            if let Err(e) = register_with_supervisor(&registration, &capabilities).await {
                warn!(error = %e, "Could not register with supervisor; continuing without registration");
            }
        });
    }

    let app = build_router(WorkerState::new(Arc::clone(&handler)));
    let bind_addr = format!("{}:{}", worker.host, worker.port);
    info!(agent = %worker.name, addr = %bind_addr, base_url = %worker.base_url(), "Starting worker");

    serve_until_ctrl_c(app, &bind_addr, shutdown_tx).await?;

    if let Some(handle) = compactor_handle {
        let _ = handle.await;
    }
    ltm.close();
    info!("Worker stopped");
    Ok(())
}
