use agentmesh_core::config::WorkerConfig;
use agentmesh_core::{Capability, Error, Result};
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Announce this worker to its supervisor via `POST {supervisor}/register`.
pub async fn register_with_supervisor(config: &WorkerConfig, capabilities: &[Capability]) -> Result<()> {
    let base_url = config.base_url();
    let url = format!("{}/register", config.supervisor_url.trim_end_matches('/'));
    let body = json!({
        "name": config.name,
        "base_url": base_url,
        "health_url": format!("{}/health", base_url),
        "capabilities": capabilities.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
    });

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.register_timeout_secs))
        .build()
        .map_err(|e| Error::Dispatch(format!("Failed to build HTTP client: {}", e)))?;

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("Registration with {} timed out", url))
            } else {
                Error::Dispatch(format!("Registration with {} failed: {}", url, e))
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(Error::Dispatch(format!(
            "Supervisor rejected registration (HTTP {}): {}",
            status.as_u16(),
            text
        )));
    }

    info!(agent = %config.name, supervisor = %config.supervisor_url, "Registered with supervisor");
    Ok(())
}
