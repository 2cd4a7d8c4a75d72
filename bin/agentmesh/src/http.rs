use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// JSON error body shared by the supervisor and worker services.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub kind: String,
    pub timestamp: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            kind: kind.to_string(),
            timestamp: agentmesh_core::iso_now(),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", error)
    }
}

impl From<agentmesh_core::Error> for ApiError {
    fn from(e: agentmesh_core::Error) -> Self {
        let status = match &e {
            agentmesh_core::Error::Validation(_) => StatusCode::BAD_REQUEST,
            agentmesh_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
            agentmesh_core::Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.kind(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Decode a JSON request body. Malformed input becomes a 400 `ApiError`
/// instead of axum's plain-text rejection.
pub fn parse_json<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid {}: {}", what, e)))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    error!(panic = %detail, "Request handler panicked");
    ApiError::internal(format!("Internal error: {}", detail)).into_response()
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive().allow_credentials(false)
}

/// Panic guard, request tracing and CORS shared by both services.
pub fn with_http_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Serve `app` on `bind_addr` until Ctrl-C, then broadcast shutdown to
/// every subscriber of `shutdown_tx`.
pub async fn serve_until_ctrl_c(
    app: axum::Router,
    bind_addr: &str,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");

    let mut http_shutdown_rx = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown_rx.recv().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("HTTP server error: {}", e)),
        Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {}", e)),
    }
}
