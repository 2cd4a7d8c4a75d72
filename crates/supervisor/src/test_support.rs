use axum::Router;
use std::net::SocketAddr;

use crate::registry::AgentRecord;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A local address nothing is listening on.
pub async fn closed_port() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn agent(name: &str, base_url: &str, caps: &[&str]) -> AgentRecord {
    AgentRecord {
        name: name.to_string(),
        base_url: base_url.to_string(),
        health_url: format!("{}/health", base_url),
        capabilities: caps.iter().map(|c| c.to_string()).collect(),
        last_seen: None,
    }
}
