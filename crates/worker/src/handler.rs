use agentmesh_core::{Capability, CompletionMessage, TaskMessage};
use agentmesh_storage::Ltm;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::executor::CapabilityExecutor;
use crate::key::ltm_key;

/// Acknowledgement returned by the asynchronous task endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAck {
    pub status: String,
    pub message_id: String,
    pub message: String,
}

/// Turns task assignments into completion reports, memoizing successful
/// results in the LTM when one is configured.
pub struct TaskHandler {
    name: String,
    executor: Arc<dyn CapabilityExecutor>,
    ltm: Option<Arc<Ltm>>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl TaskHandler {
    pub fn new(name: &str, executor: Arc<dyn CapabilityExecutor>, ltm: Option<Arc<Ltm>>) -> Self {
        Self {
            name: name.to_string(),
            executor,
            ltm,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.executor.capabilities()
    }

    pub fn ltm(&self) -> Option<&Arc<Ltm>> {
        self.ltm.as_ref()
    }

    fn cached(&self, key: &str) -> Option<Map<String, Value>> {
        match self.ltm.as_ref()?.read(key)? {
            Value::Object(map) if !map.is_empty() => Some(map),
            _ => None,
        }
    }

    fn execute(&self, capability: Capability, params: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.executor.execute(capability, params)));
        match outcome {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(format!("Task panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    /// Answer one assignment. Never panics or fails: every fault is
    /// reported as a FAILURE completion.
    pub fn handle(&self, assignment: &TaskMessage) -> CompletionMessage {
        let task_name = assignment.task.name.as_str();
        info!(
            message_id = %assignment.message_id,
            task = task_name,
            priority = assignment.task.priority.get(),
            "Received task assignment"
        );

        let capability = match Capability::from_str(task_name) {
            Some(cap) if self.executor.capabilities().contains(&cap) => cap,
            _ => {
                warn!(task = task_name, "Unknown task");
                return CompletionMessage::failure(&self.name, assignment, format!("Unknown task: {}", task_name));
            }
        };

        let params = &assignment.task.parameters.data;
        let key = ltm_key(task_name, params);

        let (mut results, ltm_hit) = match self.cached(&key) {
            Some(results) => {
                info!(key = %key, "LTM cache hit");
                (results, true)
            }
            None => match self.execute(capability, params) {
                Ok(results) => {
                    if let Some(ltm) = &self.ltm {
                        if !ltm.write(&key, &Value::Object(results.clone())) {
                            debug!(key = %key, "Result not memoized");
                        }
                    }
                    (results, false)
                }
                Err(e) => {
                    error!(message_id = %assignment.message_id, task = task_name, error = %e, "Task execution failed");
                    return CompletionMessage::failure(&self.name, assignment, e);
                }
            },
        };

        results.insert("ltm_hit".to_string(), Value::Bool(ltm_hit));
        info!(message_id = %assignment.message_id, ltm_hit, "Task completed successfully");
        CompletionMessage::success(&self.name, assignment, results)
    }

    /// Queue an assignment for background execution and acknowledge it
    /// immediately. The completion report is logged when it is ready.
    pub fn accept(self: &Arc<Self>, mut assignment: TaskMessage) -> TaskAck {
        assignment.ensure_message_id();
        let ack = TaskAck {
            status: "accepted".to_string(),
            message_id: assignment.message_id.clone(),
            message: "Task queued for execution".to_string(),
        };

        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let report = this.handle(&assignment);
            info!(
                message_id = %report.message_id,
                related_message_id = %report.related_message_id,
                status = %report.status,
                recipient = %report.recipient,
                "Completion report ready"
            );
        });

        ack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_core::config::{LtmBackendKind, LtmConfig};
    use agentmesh_core::{Error, Priority, TaskStatus};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts executions; `cost_estimation` fails and `solar_energy_estimation` panics.
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    impl CapabilityExecutor for CountingExecutor {
        fn capabilities(&self) -> Vec<Capability> {
            vec![
                Capability::BuildingEnergyAnalysis,
                Capability::CostEstimation,
                Capability::SolarEnergyEstimation,
            ]
        }

        fn execute(&self, capability: Capability, params: &Map<String, Value>) -> agentmesh_core::Result<Map<String, Value>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match capability {
                Capability::CostEstimation => Err(Error::Execution("rate table missing".to_string())),
                Capability::SolarEnergyEstimation => panic!("irradiance sensor offline"),
                _ => {
                    let mut out = Map::new();
                    out.insert("data".to_string(), json!({ "run": n, "params": params }));
                    out.insert("explainability".to_string(), json!([]));
                    out.insert("ltm_hit".to_string(), json!(false));
                    Ok(out)
                }
            }
        }
    }

    fn handler(ltm: Option<Arc<Ltm>>) -> (TaskHandler, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
        });
        (TaskHandler::new("EnergyWorker", executor.clone(), ltm), executor)
    }

    fn task(name: &str, params: Value) -> TaskMessage {
        TaskMessage::new(
            "SupervisorAgent_Main",
            "EnergyWorker",
            name,
            params.as_object().cloned().unwrap_or_default(),
            Priority::default(),
        )
    }

    fn ltm(dir: &TempDir) -> Arc<Ltm> {
        let config = LtmConfig {
            backend: LtmBackendKind::Sqlite,
            ..LtmConfig::default()
        };
        Arc::new(Ltm::open(&config, &dir.path().join("ltm.db")))
    }

    #[test]
    fn test_memoizes_identical_requests() {
        let dir = TempDir::new().unwrap();
        let (handler, executor) = handler(Some(ltm(&dir)));
        let params = json!({ "building_id": "Building-A", "date": "today" });

        let first = handler.handle(&task("building_energy_analysis", params.clone()));
        assert_eq!(first.status, TaskStatus::Success);
        assert_eq!(first.results["ltm_hit"], false);

        let second_task = task("building_energy_analysis", params);
        let second = handler.handle(&second_task);
        assert_eq!(second.status, TaskStatus::Success);
        assert_eq!(second.results["ltm_hit"], true);
        assert_eq!(second.results["data"], first.results["data"]);
        assert_eq!(second.related_message_id, second_task.message_id);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_without_ltm_always_executes() {
        let (handler, executor) = handler(None);
        let params = json!({ "building_id": "Building-A" });
        handler.handle(&task("building_energy_analysis", params.clone()));
        let second = handler.handle(&task("building_energy_analysis", params));
        assert_eq!(second.results["ltm_hit"], false);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_execution_error_is_failure() {
        let dir = TempDir::new().unwrap();
        let store = ltm(&dir);
        let (handler, _) = handler(Some(store.clone()));

        let assignment = task("cost_estimation", json!({ "building_id": "Building-A" }));
        let report = handler.handle(&assignment);
        assert_eq!(report.status, TaskStatus::Failure);
        assert!(report.results.is_empty());
        assert!(report.error.as_deref().unwrap().contains("rate table missing"));
        assert_eq!(report.related_message_id, assignment.message_id);
        assert_eq!(report.recipient, "SupervisorAgent_Main");
        assert!(report.validate().is_ok());
        // Failures are never memoized.
        assert!(store.read("cost_estimation:Building-A").is_none());
    }

    #[test]
    fn test_panicking_executor_is_failure() {
        let (handler, _) = handler(None);
        let report = handler.handle(&task("solar_energy_estimation", json!({})));
        assert_eq!(report.status, TaskStatus::Failure);
        assert!(report.error.unwrap().contains("irradiance sensor offline"));
    }

    #[test]
    fn test_unknown_task_is_failure() {
        let (handler, executor) = handler(None);
        let report = handler.handle(&task("weather_report", json!({})));
        assert_eq!(report.status, TaskStatus::Failure);
        assert_eq!(report.error.as_deref(), Some("Unknown task: weather_report"));

        // Known capability the executor does not advertise.
        let report = handler.handle(&task("peak_load_forecasting", json!({})));
        assert_eq!(report.status, TaskStatus::Failure);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_accept_acknowledges_and_runs() {
        let (handler, executor) = handler(None);
        let handler = Arc::new(handler);
        let mut assignment = task("building_energy_analysis", json!({}));
        assignment.message_id = String::new();

        let ack = handler.accept(assignment);
        assert_eq!(ack.status, "accepted");
        assert_eq!(ack.message, "Task queued for execution");
        assert!(!ack.message_id.is_empty());

        for _ in 0..50 {
            if executor.calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }
}
