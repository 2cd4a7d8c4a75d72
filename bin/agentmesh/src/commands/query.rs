use agentmesh_core::{Config, Paths};
use agentmesh_supervisor::{AgentRegistry, Dispatcher};
use std::sync::Arc;

/// Route a prompt against the local registry and print the outcome.
pub async fn run(paths: &Paths, config: &Config, prompt: &str, user: &str) -> anyhow::Result<()> {
    let registry = Arc::new(AgentRegistry::open(&paths.resolve(&config.supervisor.registry_path)));
    let dispatcher = Dispatcher::new(registry, &config.supervisor);

    let outcome = dispatcher.route(prompt, user).await;
    let pretty = serde_json::to_string_pretty(&outcome)
        .map_err(|e| anyhow::anyhow!("Failed to format outcome: {}", e))?;
    println!("{}", pretty);
    Ok(())
}
