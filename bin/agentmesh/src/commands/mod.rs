pub mod health;
pub mod ltm;
pub mod query;
pub mod registry;
pub mod supervisor;
pub mod worker;

use agentmesh_core::{Config, Paths};
use std::path::PathBuf;

/// Resolve the base directory, load `config.json` (defaults when absent)
/// and apply environment overrides.
pub fn load_config(home: Option<PathBuf>) -> anyhow::Result<(Paths, Config)> {
    let paths = match home {
        Some(base) => Paths::with_base(base),
        None => Paths::default(),
    };
    let mut config = Config::load_or_default(&paths)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", paths.config_file().display(), e))?;
    config.apply_env_overrides();
    Ok((paths, config))
}
