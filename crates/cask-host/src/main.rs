use std::path::PathBuf;

use anyhow::Result;
use cask_failover::{BagSpool, CaskConfig, FailoverConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

mod components;
mod demo;
mod inspect;

#[derive(Parser)]
#[command(name = "cask", about = "cask container host: session failover demo and bag inspection")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a session on node A, passivate it, and restore it on node B
    Demo {
        /// TOML config with a [failover] table; defaults to everything enabled
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory bags are spooled through (default: ~/.cask/spool)
        #[arg(long)]
        spool_dir: Option<PathBuf>,
    },
    /// Print the metadata of a spooled bag
    Inspect {
        /// Path to a .bag.json file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so reports on stdout stay machine-readable
    fmt()
        .with_env_filter(EnvFilter::from_env("CASK_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Demo { config, spool_dir } => {
            let config = match config {
                Some(path) => CaskConfig::from_file(&path)?.failover,
                None => FailoverConfig {
                    support_failover: true,
                    support_passivation: true,
                    resource_serialization_handler: Some(components::REMOTE_HANDLES.into()),
                },
            };
            let spool = BagSpool::new(spool_dir.unwrap_or_else(BagSpool::default_path));
            tracing::info!(spool = %spool.base_dir().display(), "Running failover demo");

            let report = demo::run(&config, &spool).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Inspect { file } => {
            let summary = inspect::run(&file).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
