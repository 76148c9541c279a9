//! Operational logging
//!
//! Sets up the global `tracing` subscriber in `pretty` or `json` format.
//! This is separate from the deployment audit log, although every audit
//! entry is also emitted here under the `audit` target.
//!
//! Each webhook request runs inside a `webhook` span:
//! ```rust,ignore
//! let span = logging::webhook_span(event.delivery_id());
//! pipeline.process(event).instrument(span).await;
//! ```

use tracing::{info_span, Span};
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

use crate::config::SystemConfig;
use crate::types::{Error, Result};

/// Span for one webhook delivery, keyed by the sender's delivery id
pub fn webhook_span(delivery_id: &str) -> Span {
    info_span!("webhook", delivery_id = delivery_id)
}

/// Log level values accepted in configuration and on the command line
pub mod level {
    pub const TRACE: &str = "trace";
    pub const DEBUG: &str = "debug";
    pub const INFO: &str = "info";
    pub const WARN: &str = "warn";
    pub const ERROR: &str = "error";

    pub const ALL: [&str; 5] = [TRACE, DEBUG, INFO, WARN, ERROR];
}

/// Log format values accepted in configuration and on the command line
pub mod format {
    pub const JSON: &str = "json";
    pub const PRETTY: &str = "pretty";

    pub const ALL: [&str; 2] = [JSON, PRETTY];
}

/// Initialize logging with configuration
///
/// # Precedence
///
/// 1. `RUST_LOG` for the filter, then CLI arguments
/// 2. System configuration file
/// 3. Default values
pub fn init(
    log_level_override: Option<&str>,
    log_format_override: Option<&str>,
    system_config: Option<&SystemConfig>,
) -> Result<()> {
    let log_level = if let Some(level) = log_level_override {
        level
    } else if let Some(config) = system_config {
        &config.logging.level
    } else {
        level::INFO
    };

    let log_format = if let Some(fmt) = log_format_override {
        fmt
    } else if let Some(config) = system_config {
        &config.logging.format
    } else {
        format::PRETTY
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    let installed = match log_format {
        format::JSON => tracing_subscriber::fmt()
            .json()
            .with_timer(timer)
            .with_env_filter(env_filter)
            .with_target(false)
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_timer(timer)
            .with_env_filter(env_filter)
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .try_init(),
    };

    installed.map_err(|e| Error::Application(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_span_creation() {
        let span = webhook_span("72d3162e-cc78-11e3-81ab-4c9367dc0958");
        // Metadata is only present when a subscriber is installed
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "webhook");
        }
        let _guard = span.enter();
    }

    #[test]
    fn test_level_constants() {
        assert_eq!(level::ALL, ["trace", "debug", "info", "warn", "error"]);
        assert_eq!(format::ALL, ["json", "pretty"]);
    }
}
