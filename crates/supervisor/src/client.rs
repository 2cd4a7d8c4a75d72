use agentmesh_core::TaskMessage;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a single call to a worker did not produce a usable reply.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("connect error: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {code}")]
    Status { code: u16, body: String },

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DispatchError::Timeout
        } else if e.is_connect() {
            DispatchError::Connect(e.to_string())
        } else {
            DispatchError::Other(e.to_string())
        }
    }
}

/// Build a reqwest client whose every request is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with timeout, using default client");
        Client::new()
    })
}

/// HTTP client for the worker task endpoint.
#[derive(Clone)]
pub struct WorkerClient {
    http: Client,
}

impl WorkerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: build_http_client(timeout),
        }
    }

    /// POST the task to `{base_url}/task/sync` and return the worker's
    /// completion report as raw JSON.
    pub async fn send_task(&self, base_url: &str, message: &TaskMessage) -> Result<Value, DispatchError> {
        let url = format!("{}/task/sync", base_url.trim_end_matches('/'));
        debug!(url = %url, task = %message.task.name, message_id = %message.message_id, "Sending task");

        let response = self.http.post(&url).json(message).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout
            } else {
                DispatchError::Other(format!("Invalid response body: {}", e))
            }
        })
    }
}
