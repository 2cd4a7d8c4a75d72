use agentmesh_core::{Config, Paths};
use agentmesh_storage::Ltm;
use std::path::PathBuf;

/// Open the worker's LTM, or `None` when nothing has been stored yet.
fn open_existing(paths: &Paths, config: &Config) -> Option<Ltm> {
    let path = paths.resolve(&config.ltm.path);
    let fallback = path.with_extension("json");
    if !path.exists() && !fallback.exists() {
        println!("(LTM not created yet: {})", path.display());
        return None;
    }
    Some(Ltm::open(&config.ltm, &path))
}

fn ltm_path(paths: &Paths, config: &Config) -> PathBuf {
    paths.resolve(&config.ltm.path)
}

/// Show LTM statistics.
pub fn stats(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    let Some(ltm) = open_existing(paths, config) else {
        return Ok(());
    };
    let stats = ltm.stats();
    ltm.close();

    println!();
    println!("LTM Statistics");
    println!("  Backend:  {}", stats.backend.as_str());
    println!("  Path:     {}", stats.path);
    println!("  Entries:  {}", stats.entries);
    println!("  TTL:      {} days", stats.ttl_days);
    println!();
    Ok(())
}

/// List unexpired entries under a key prefix.
pub fn query(paths: &Paths, config: &Config, prefix: &str) -> anyhow::Result<()> {
    let Some(ltm) = open_existing(paths, config) else {
        return Ok(());
    };
    let records = ltm.query(prefix);
    ltm.close();

    println!();
    if records.is_empty() {
        println!("(No matching entries)");
    } else {
        println!("{} entr{}:", records.len(), if records.len() == 1 { "y" } else { "ies" });
        for record in &records {
            println!("  {}  (created {}, updated {})", record.key, record.created_at, record.updated_at);
        }
    }
    println!();
    Ok(())
}

/// Print one entry's cached result.
pub fn get(paths: &Paths, config: &Config, key: &str) -> anyhow::Result<()> {
    let Some(ltm) = open_existing(paths, config) else {
        return Ok(());
    };
    let value = ltm.read(key);
    ltm.close();

    match value {
        Some(value) => {
            let pretty = serde_json::to_string_pretty(&value)
                .map_err(|e| anyhow::anyhow!("Failed to format entry: {}", e))?;
            println!("{}", pretty);
        }
        None => println!("(No entry for '{}', or it has expired)", key),
    }
    Ok(())
}

/// Remove expired entries now.
pub fn compact(paths: &Paths, config: &Config) -> anyhow::Result<()> {
    let Some(ltm) = open_existing(paths, config) else {
        return Ok(());
    };
    let removed = ltm.compact();
    ltm.close();
    println!(
        "Removed {} expired entr{} from {}",
        removed,
        if removed == 1 { "y" } else { "ies" },
        ltm_path(paths, config).display()
    );
    Ok(())
}
