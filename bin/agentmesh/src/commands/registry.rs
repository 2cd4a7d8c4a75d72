use agentmesh_core::{Capability, Config, Paths};
use agentmesh_supervisor::{AgentRegistry, RegisterRequest};

fn open(paths: &Paths, config: &Config) -> AgentRegistry {
    AgentRegistry::open(&paths.resolve(&config.supervisor.registry_path))
}

/// List registered agents.
pub async fn list(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    let registry = open(paths, config);
    let agents = registry.get_all().await;

    println!();
    if agents.is_empty() {
        println!("(No agents registered)");
    } else {
        println!("Agents ({}):", agents.len());
        for agent in &agents {
            println!("  {}", agent.name);
            println!("    base_url:     {}", agent.base_url);
            println!("    health_url:   {}", agent.health_endpoint());
            println!("    capabilities: {}", agent.capabilities.join(", "));
            println!("    last_seen:    {}", agent.last_seen.as_deref().unwrap_or("-"));
        }
    }
    println!();
    Ok(())
}

/// Register or replace an agent directly in the registry file.
pub async fn add(
    paths: &Paths,
    config: &Config,
    name: String,
    base_url: String,
    health_url: Option<String>,
    capabilities: Vec<String>,
) -> anyhow::Result<()> {
    for cap in &capabilities {
        if Capability::from_str(cap).is_none() {
            println!("Warning: '{}' is not a known capability and will never be routed", cap);
        }
    }

    let registry = open(paths, config);
    let ok = registry
        .register(RegisterRequest {
            name: name.clone(),
            base_url,
            health_url: health_url.unwrap_or_default(),
            capabilities,
        })
        .await;
    if !ok {
        return Err(anyhow::anyhow!("Failed to register agent '{}'", name));
    }

    println!("Registered {} in {}", name, registry.path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_add_persists_to_configured_path() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let config = Config::default();

        add(
            &paths,
            &config,
            "EnergyWorker".to_string(),
            "localhost:8001".to_string(),
            None,
            vec!["cost_estimation".to_string()],
        )
        .await
        .unwrap();
        list(&paths, &config).await.unwrap();

        let registry = open(&paths, &config);
        let agent = registry.get("EnergyWorker").await.unwrap();
        assert_eq!(agent.base_url, "http://localhost:8001");
        assert_eq!(agent.health_endpoint(), "http://localhost:8001/health");
    }

    #[tokio::test]
    async fn test_add_rejects_blank_name() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let result = add(&paths, &Config::default(), " ".to_string(), "localhost:8001".to_string(), None, vec![]).await;
        assert!(result.is_err());
    }
}
