mod commands;
mod http;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(about = "Capability broker and worker agents with memoized task execution", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text or json (overrides config logging.format)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Base directory for config, registry and LTM files (default ~/.agentmesh)
    #[arg(long, global = true, env = "AGENTMESH_HOME")]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor HTTP service
    Supervisor {
        /// Host to bind to (overrides config supervisor.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config supervisor.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run the worker HTTP service
    Worker {
        /// Host to bind to (overrides config worker.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config worker.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Inspect or edit the agent registry file
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },

    /// Route a prompt against the local registry
    Query {
        /// Free-text prompt
        prompt: String,

        /// User identifier recorded in logs
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Probe every registered agent once
    Health,

    /// Inspect or maintain the worker's long-term memory
    Ltm {
        #[command(subcommand)]
        command: LtmCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// List registered agents
    List,
    /// Register or replace an agent
    Add {
        /// Agent name
        name: String,
        /// Agent base URL (scheme optional)
        base_url: String,
        /// Health URL (defaults to <base_url>/health)
        #[arg(long)]
        health_url: Option<String>,
        /// Advertised capability (repeatable)
        #[arg(short, long = "capability")]
        capabilities: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LtmCommands {
    /// Show backend, path and entry count
    Stats,
    /// List unexpired entries whose key starts with a prefix
    Query {
        /// Key prefix (empty lists everything)
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Fetch one entry
    Get {
        key: String,
    },
    /// Remove expired entries
    Compact,
}

fn init_tracing(verbose: bool, format: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (paths, config) = commands::load_config(cli.home.clone())?;
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    init_tracing(cli.verbose, &format);

    match cli.command {
        Commands::Supervisor { host, port } => {
            commands::supervisor::run(&paths, config, host, port).await?;
        }
        Commands::Worker { host, port } => {
            commands::worker::run(&paths, config, host, port).await?;
        }
        Commands::Registry { command } => match command {
            RegistryCommands::List => {
                commands::registry::list(&paths, &config).await?;
            }
            RegistryCommands::Add {
                name,
                base_url,
                health_url,
                capabilities,
            } => {
                commands::registry::add(&paths, &config, name, base_url, health_url, capabilities).await?;
            }
        },
        Commands::Query { prompt, user } => {
            commands::query::run(&paths, &config, &prompt, &user).await?;
        }
        Commands::Health => {
            commands::health::run(&paths, &config).await?;
        }
        Commands::Ltm { command } => match command {
            LtmCommands::Stats => commands::ltm::stats(&paths, &config)?,
            LtmCommands::Query { prefix } => commands::ltm::query(&paths, &config, &prefix)?,
            LtmCommands::Get { key } => commands::ltm::get(&paths, &config, &key)?,
            LtmCommands::Compact => commands::ltm::compact(&paths, &config)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_home_from_flag_or_env() {
        let cli = Cli::try_parse_from(["agentmesh", "--home", "/srv/mesh", "health"]).unwrap();
        assert_eq!(cli.home, Some(PathBuf::from("/srv/mesh")));

        std::env::set_var("AGENTMESH_HOME", "/var/lib/agentmesh");
        let cli = Cli::try_parse_from(["agentmesh", "ltm", "stats"]).unwrap();
        std::env::remove_var("AGENTMESH_HOME");
        assert_eq!(cli.home, Some(PathBuf::from("/var/lib/agentmesh")));
    }
}
