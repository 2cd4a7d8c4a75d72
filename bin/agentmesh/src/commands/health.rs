use agentmesh_core::{Config, Paths};
use agentmesh_supervisor::{AgentRegistry, HealthAggregator, HealthStatus};
use std::sync::Arc;

/// Probe every registered agent once and print a summary.
pub async fn run(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    let registry = Arc::new(AgentRegistry::open(&paths.resolve(&config.supervisor.registry_path)));
    let aggregator = Arc::new(HealthAggregator::new(registry, &config.supervisor));
    let report = aggregator.aggregate().await;

    println!();
    println!("Agents healthy: {}/{}", report.healthy_agents, report.total_agents);
    for agent in &report.agents {
        let marker = if agent.status == HealthStatus::Healthy { "✓" } else { "✗" };
        let latency = agent
            .response_time_ms
            .map(|ms| format!("{:.2} ms", ms))
            .unwrap_or_else(|| "-".to_string());
        match &agent.error {
            Some(err) => println!("  {} {:<28} {:?} {} ({})", marker, agent.name, agent.status, latency, err),
            None => println!("  {} {:<28} {:?} {}", marker, agent.name, agent.status, latency),
        }
    }
    println!();
    Ok(())
}
