use agentmesh_core::config::SupervisorConfig;
use agentmesh_core::{Capability, Priority, TaskMessage, TaskStatus};
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use crate::client::{DispatchError, WorkerClient};
use crate::intent::{Intent, IntentRouter};
use crate::params::extract_parameters;
use crate::registry::{normalize_url, AgentRecord, AgentRegistry};

const NO_AGENT_ERROR: &str = "No agent found to handle this query";
const NO_AGENT_SUGGESTIONS: [&str; 3] = [
    "Try asking about building energy analysis",
    "Request energy saving recommendations",
    "Ask for peak load forecasting",
];

/// One capability's outcome inside a multi-capability route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityResponse {
    pub capability: Capability,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explainability: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
}

impl RouteSummary {
    fn from_responses(total_requested: usize, responses: &[CapabilityResponse]) -> Self {
        let successful = responses.iter().filter(|r| r.status == TaskStatus::Success).count();
        let failed = responses.iter().filter(|r| r.status == TaskStatus::Failure).count();
        Self {
            total_requested,
            successful,
            failed,
        }
    }
}

/// A single-capability call that never produced a worker reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchFailure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl DispatchFailure {
    fn new(err: &DispatchError, agent_url: &str) -> Self {
        let agent_url = Some(agent_url.to_string());
        match err {
            DispatchError::Timeout => Self {
                error: "Agent request timed out".to_string(),
                agent_url,
                suggestion: Some("Check if the agent is running and accessible".to_string()),
                details: None,
            },
            DispatchError::Connect(cause) => Self {
                error: connect_error(agent_url.as_deref().unwrap_or_default()),
                agent_url,
                suggestion: Some(
                    "Verify the agent URL is correct and that the agent is deployed on a reachable host (not localhost)"
                        .to_string(),
                ),
                details: Some(cause.clone()),
            },
            DispatchError::Status { code, body } => Self {
                error: format!("Agent returned error: {}", code),
                agent_url,
                suggestion: None,
                details: Some(body.clone()),
            },
            DispatchError::Other(cause) => Self {
                error: cause.clone(),
                agent_url,
                suggestion: None,
                details: None,
            },
        }
    }
}

fn connect_error(agent_url: &str) -> String {
    format!("Could not connect to agent at {}", agent_url)
}

/// Result of routing one prompt. Serializes to the flat JSON shapes the
/// HTTP API returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RouteOutcome {
    NoAgent {
        error: String,
        suggestions: Vec<String>,
    },
    Single {
        agent: String,
        capability: Capability,
        response: Value,
    },
    Multi {
        agent: String,
        capabilities: Vec<Capability>,
        responses: Vec<CapabilityResponse>,
        results: Map<String, Value>,
        summary: RouteSummary,
    },
    Failed(DispatchFailure),
}

impl RouteOutcome {
    fn no_agent() -> Self {
        RouteOutcome::NoAgent {
            error: NO_AGENT_ERROR.to_string(),
            suggestions: NO_AGENT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    router: IntentRouter,
    client: WorkerClient,
    sender: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, config: &SupervisorConfig) -> Self {
        Self::with_client(
            registry,
            WorkerClient::new(Duration::from_secs(config.task_timeout_secs)),
            &config.sender_name,
        )
    }

    pub fn with_client(registry: Arc<AgentRegistry>, client: WorkerClient, sender: &str) -> Self {
        Self {
            registry,
            router: IntentRouter::new(),
            client,
            sender: sender.to_string(),
        }
    }

    /// Route a prompt to the first agent able to serve it and collect the
    /// replies. Worker faults are folded into the outcome, never returned.
    pub async fn route(&self, prompt: &str, user_id: &str) -> RouteOutcome {
        let span = info_span!("route", user_id = %user_id);
        self.route_inner(prompt, Local::now().date_naive())
            .instrument(span)
            .await
    }

    async fn route_inner(&self, prompt: &str, today: NaiveDate) -> RouteOutcome {
        let agents = self.registry.get_all().await;
        match self.router.detect_intent(prompt, &agents) {
            None => {
                info!("No agent matched the query");
                RouteOutcome::no_agent()
            }
            Some(Intent::Single { agent, capability }) => {
                self.dispatch_single(&agent, capability, prompt, today).await
            }
            Some(Intent::Multi { agent, capabilities }) => {
                self.dispatch_multi(&agent, capabilities, prompt, today).await
            }
        }
    }

    fn build_message(&self, agent: &AgentRecord, capability: Capability, prompt: &str, today: NaiveDate) -> TaskMessage {
        TaskMessage::new(
            &self.sender,
            &agent.name,
            capability.as_str(),
            extract_parameters(prompt, capability, today),
            Priority::default(),
        )
    }

    async fn dispatch_single(
        &self,
        agent: &AgentRecord,
        capability: Capability,
        prompt: &str,
        today: NaiveDate,
    ) -> RouteOutcome {
        let message = self.build_message(agent, capability, prompt, today);
        let base_url = normalize_url(&agent.base_url);
        info!(agent = %agent.name, capability = %capability, "Dispatching task");

        match self.client.send_task(&base_url, &message).await {
            Ok(response) => {
                self.registry.touch(&agent.name).await;
                RouteOutcome::Single {
                    agent: agent.name.clone(),
                    capability,
                    response,
                }
            }
            Err(e) => {
                warn!(agent = %agent.name, capability = %capability, error = %e, "Task dispatch failed");
                if matches!(e, DispatchError::Status { .. }) {
                    // The agent answered, so it is alive.
                    self.registry.touch(&agent.name).await;
                }
                RouteOutcome::Failed(DispatchFailure::new(&e, &agent.base_url))
            }
        }
    }

    async fn dispatch_multi(
        &self,
        agent: &AgentRecord,
        capabilities: Vec<Capability>,
        prompt: &str,
        today: NaiveDate,
    ) -> RouteOutcome {
        let base_url = normalize_url(&agent.base_url);
        info!(agent = %agent.name, count = capabilities.len(), "Dispatching tasks concurrently");

        let calls = capabilities.iter().map(|&capability| {
            let message = self.build_message(agent, capability, prompt, today);
            let base_url = base_url.as_str();
            async move { (capability, self.client.send_task(base_url, &message).await) }
        });
        let outcomes = join_all(calls).await;

        let mut responses = Vec::with_capacity(outcomes.len());
        let mut results = Map::new();
        for (capability, outcome) in outcomes {
            match outcome {
                Ok(reply) => {
                    responses.push(response_from_reply(capability, &reply));
                    results.insert(capability.as_str().to_string(), reply);
                }
                Err(e) => {
                    warn!(agent = %agent.name, capability = %capability, error = %e, "Task dispatch failed");
                    let (summary_error, detail) = failure_entry(&e, &agent.base_url);
                    responses.push(CapabilityResponse {
                        capability,
                        status: TaskStatus::Failure,
                        data: None,
                        explainability: None,
                        error: Some(summary_error),
                    });
                    results.insert(capability.as_str().to_string(), detail);
                }
            }
        }

        self.registry.touch(&agent.name).await;

        let summary = RouteSummary::from_responses(capabilities.len(), &responses);
        info!(
            agent = %agent.name,
            successful = summary.successful,
            failed = summary.failed,
            "Multi-capability route finished"
        );

        RouteOutcome::Multi {
            agent: agent.name.clone(),
            capabilities,
            responses,
            results,
            summary,
        }
    }
}

/// Flatten a worker completion report into a per-capability record.
fn response_from_reply(capability: Capability, reply: &Value) -> CapabilityResponse {
    let status = reply
        .get("status")
        .and_then(|s| serde_json::from_value::<TaskStatus>(s.clone()).ok())
        .unwrap_or(TaskStatus::Success);
    let results = reply.get("results");
    let data = results
        .and_then(|r| r.get("data"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let explainability = results
        .and_then(|r| r.get("explainability"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    let error = match status {
        TaskStatus::Failure => reply.get("error").and_then(Value::as_str).map(str::to_string),
        TaskStatus::Success => None,
    };

    CapabilityResponse {
        capability,
        status,
        data: Some(data),
        explainability: Some(explainability),
        error,
    }
}

/// Short error for the response list plus the detailed entry for the
/// per-capability result map.
fn failure_entry(err: &DispatchError, agent_url: &str) -> (String, Value) {
    match err {
        DispatchError::Timeout => (
            "Request timed out".to_string(),
            json!({ "error": "Agent request timed out" }),
        ),
        DispatchError::Status { code, body } => (
            format!("HTTP {}", code),
            json!({ "error": format!("Agent returned error: {}", code), "details": body }),
        ),
        DispatchError::Connect(cause) => (
            connect_error(agent_url),
            json!({ "error": connect_error(agent_url), "details": cause }),
        ),
        DispatchError::Other(cause) => (cause.clone(), json!({ "error": cause })),
    }
}
