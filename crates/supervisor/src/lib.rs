pub mod client;
pub mod dispatcher;
pub mod health;
pub mod intent;
pub mod params;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{DispatchError, WorkerClient};
pub use dispatcher::{CapabilityResponse, DispatchFailure, Dispatcher, RouteOutcome, RouteSummary};
pub use health::{AgentHealth, AggregateHealth, HealthAggregator, HealthMonitor, HealthStatus};
pub use intent::{Intent, IntentRouter};
pub use params::extract_parameters;
pub use registry::{normalize_url, AgentRecord, AgentRegistry, RegisterRequest};
