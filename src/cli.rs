use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, instrument, warn};

use crate::auth::{AuthMode, HmacValidator};
use crate::config::{Settings, SystemConfig};
use crate::types::{Error, Result};

#[derive(Parser)]
#[command(name = "pushgate")]
#[command(about = "A push-webhook deployment trigger")]
#[command(long_about = "
A single-binary HTTP service that receives source-control push notifications,
authenticates them and runs a local deployment script when the configured
branch is updated.
")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// System configuration file path
    #[arg(short, long, default_value = "/etc/pushgate/config.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the webhook receiver server (default if no subcommand given)
    Run(RunArgs),
    /// Validate the configuration file
    Validate,
    /// Show version information
    Version,
    /// Print the signature header value for a payload file
    Sign(SignArgs),
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// Override listen address (format: "host:port")
    #[arg(long)]
    pub listen: Option<String>,

    /// Set log format
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

#[derive(Args, Clone)]
pub struct SignArgs {
    /// Payload file to sign, exactly as it will be sent
    #[arg(long)]
    pub file: PathBuf,
}

impl Cli {
    /// Get effective log level considering verbose/quiet flags
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else if self.quiet {
            LogLevel::Error
        } else {
            self.log_level.clone().unwrap_or(LogLevel::Info)
        }
    }

    /// Convert LogLevel enum to string for logging module
    pub fn log_level_to_str(&self) -> &'static str {
        match self.effective_log_level() {
            LogLevel::Trace => crate::logging::level::TRACE,
            LogLevel::Debug => crate::logging::level::DEBUG,
            LogLevel::Info => crate::logging::level::INFO,
            LogLevel::Warn => crate::logging::level::WARN,
            LogLevel::Error => crate::logging::level::ERROR,
        }
    }

    /// Get log format override from CLI arguments
    pub fn log_format_override(&self) -> Option<&'static str> {
        match &self.command {
            Some(Commands::Run(args)) => args.log_format.as_ref().map(|fmt| match fmt {
                LogFormat::Json => crate::logging::format::JSON,
                LogFormat::Pretty => crate::logging::format::PRETTY,
            }),
            _ => None,
        }
    }
}

fn load_config(cli: &Cli, system_config: Option<SystemConfig>) -> Result<SystemConfig> {
    match system_config {
        Some(config) => Ok(config),
        None => {
            info!("Loading system configuration...");
            SystemConfig::load_from_file(&cli.config)
        }
    }
}

/// Run the webhook receiver server
#[instrument(skip_all)]
pub async fn run_server(
    cli: Cli,
    args: RunArgs,
    system_config: Option<SystemConfig>,
) -> Result<()> {
    let mut system_config = load_config(&cli, system_config)?;
    if let Some(listen) = args.listen {
        system_config.server.listen = listen;
    }
    system_config.validate()?;

    let settings = Settings::from_config(&system_config)?;

    info!(
        config_path = %cli.config.display(),
        auth_mode = settings.auth.name(),
        branch = %settings.target_branch,
        script = %settings.script.display(),
        "Configuration loaded successfully"
    );

    if let AuthMode::Permissive { user_agent_marker } = &settings.auth {
        warn!(
            user_agent_marker = %user_agent_marker,
            "Permissive authentication is enabled: deliveries are NOT signature-checked"
        );
    }

    if !settings.script.exists() {
        warn!(
            script = %settings.script.display(),
            "Deployment script does not exist yet; deliveries will fail until it is created"
        );
    }

    let shutdown_signal = setup_shutdown_signal();

    crate::http::start_server(system_config, settings, shutdown_signal).await?;
    Ok(())
}

/// Validate the configuration file
#[instrument(skip_all)]
pub async fn validate_config(cli: Cli, system_config: Option<SystemConfig>) -> Result<()> {
    info!("Validating configuration file...");

    let config = load_config(&cli, system_config)?;

    if let Err(e) = config.validate() {
        error!(
            config_path = %cli.config.display(),
            error = %e,
            "System configuration validation failed"
        );
        return Err(e);
    }

    let settings = Settings::from_config(&config)?;

    info!(
        config_path = %cli.config.display(),
        auth_mode = settings.auth.name(),
        branch = %settings.target_branch,
        "System configuration is valid"
    );

    if matches!(settings.auth, AuthMode::Permissive { .. }) {
        warn!("Authentication mode is permissive; deliveries are not signature-checked");
    }

    if settings.script.is_file() {
        info!(script = %settings.script.display(), "Deployment script found");
    } else {
        warn!(script = %settings.script.display(), "Deployment script not found");
    }

    Ok(())
}

/// Print `sha256=<hex>` for a payload file using the configured secret
#[instrument(skip_all)]
pub async fn sign_payload(
    cli: Cli,
    args: SignArgs,
    system_config: Option<SystemConfig>,
) -> Result<()> {
    let config = load_config(&cli, system_config)?;
    let secret = crate::secrets::load_first(&config.auth.secret_loaders())?;

    let payload = tokio::fs::read(&args.file).await.map_err(|e| {
        error!(file = %args.file.display(), error = %e, "Failed to read payload file");
        Error::Io(e)
    })?;

    println!("{}", HmacValidator::new(&secret).sign(&payload));
    Ok(())
}

/// Show version information
#[instrument]
pub async fn show_version() -> Result<()> {
    println!("pushgate {}", env!("CARGO_PKG_VERSION"));
    println!("Description: {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();

    println!("Build Information:");
    println!(
        "  Build Profile: {}",
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        }
    );
    println!();

    println!("Runtime Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Architecture: {}", std::env::consts::ARCH);

    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_defaults() {
        let cli = Cli::try_parse_from(["pushgate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("/etc/pushgate/config.toml"));
        assert_eq!(cli.log_level_to_str(), "info");
        assert!(cli.log_format_override().is_none());
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "pushgate",
            "--config",
            "/srv/site/pushgate.toml",
            "-v",
            "run",
            "--listen",
            "0.0.0.0:9000",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_level_to_str(), "debug");
        assert_eq!(cli.log_format_override(), Some("json"));
        match cli.command {
            Some(Commands::Run(args)) => assert_eq!(args.listen.as_deref(), Some("0.0.0.0:9000")),
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["pushgate", "-v", "-q"]).is_err());
        let cli = Cli::try_parse_from(["pushgate", "-q", "validate"]).unwrap();
        assert_eq!(cli.log_level_to_str(), "error");
    }

    #[test]
    fn test_sign_requires_file() {
        assert!(Cli::try_parse_from(["pushgate", "sign"]).is_err());
        let cli = Cli::try_parse_from(["pushgate", "sign", "--file", "payload.json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Sign(_))));
    }
}
