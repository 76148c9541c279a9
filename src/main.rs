mod audit;
mod auth;
mod cli;
mod config;
mod execution;
mod http;
mod logging;
mod metrics;
mod secrets;
mod state;
mod types;
mod webhook;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Commands, RunArgs};
use crate::config::SystemConfig;
use crate::types::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is loaded early only to pick up logging preferences
    let system_config = match &cli.command {
        Some(Commands::Version) => None,
        _ => SystemConfig::load_from_file(&cli.config).ok(),
    };

    let log_level_override = if cli.log_level.is_some() || cli.verbose || cli.quiet {
        Some(cli.log_level_to_str())
    } else {
        None
    };

    crate::logging::init(
        log_level_override,
        cli.log_format_override(),
        system_config.as_ref(),
    )?;

    crate::metrics::init_metrics();

    info!("Starting pushgate");

    match cli.command.clone().unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => cli::run_server(cli, args, system_config).await,
        Commands::Validate => cli::validate_config(cli, system_config).await,
        Commands::Version => cli::show_version().await,
        Commands::Sign(args) => cli::sign_payload(cli, args, system_config).await,
    }
}
