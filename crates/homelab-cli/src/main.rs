//! homelab CLI
//!
//! Provisions the NFS-backed Colima, k3d and Ollama environment.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use homelab_core::LabConfig;
use std::path::PathBuf;

/// homelab - provision an NFS-backed container and model-serving workstation
#[derive(Parser, Debug)]
#[command(name = "homelab")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "homelab.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the provisioning pipeline
    Up {
        /// Record commands instead of executing them
        #[arg(long)]
        dry_run: bool,

        /// Result format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Tear the environment down in reverse order
    Down {
        /// Record commands instead of executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the resolved configuration and step order
    Plan,

    /// Check NAS connectivity and required tools
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = LabConfig::load(&cli.config);

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };
    init_tracing(&level)?;

    let config = config?;

    match cli.command {
        Commands::Up { dry_run, output } => {
            commands::up(&config, dry_run, output).await?;
        }
        Commands::Down { dry_run } => {
            commands::down(&config, dry_run).await?;
        }
        Commands::Plan => {
            commands::plan(&config)?;
        }
        Commands::Check => {
            commands::check(&config).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
