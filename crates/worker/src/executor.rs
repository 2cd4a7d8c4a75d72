use agentmesh_core::{Capability, Result};
use serde_json::{Map, Value};

/// Domain logic behind a worker's advertised capabilities.
///
/// `execute` returns the `results` map of a completion report, normally
/// `{data, explainability, ltm_hit}`. Errors become FAILURE reports.
pub trait CapabilityExecutor: Send + Sync {
    fn capabilities(&self) -> Vec<Capability>;

    fn execute(&self, capability: Capability, params: &Map<String, Value>) -> Result<Map<String, Value>>;
}
