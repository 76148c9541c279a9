use regex::Regex;
use std::net::SocketAddr;

use super::types::{AuthModeKind, SystemConfig};
use crate::logging;
use crate::types::Result;

// Validation helper functions

/// Validate listen address format (host:port)
pub(crate) fn validate_listen_address(addr: &str) -> Result<()> {
    addr.parse::<SocketAddr>()
        .map_err(|_| crate::types::Error::Validation {
            field: "server.listen".to_string(),
            message: format!("Invalid listen address format '{}'. Expected format: 'host:port' (e.g., '127.0.0.1:8080')", addr),
        })?;
    Ok(())
}

/// Validate an HTTP route path
pub(crate) fn validate_route_path(path: &str, field: &str) -> Result<()> {
    if !path.starts_with('/') || path.contains(char::is_whitespace) {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!(
                "Invalid route path '{}'. Must start with '/' and contain no whitespace",
                path
            ),
        });
    }
    Ok(())
}

/// Validate positive timeout value
pub(crate) fn validate_positive_timeout(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: "Timeout must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// The HTTP layer must not give up on a request before the deployment it runs
pub(crate) fn validate_timeout_relationship(request_timeout: u64, deploy_timeout: u64) -> Result<()> {
    if request_timeout <= deploy_timeout {
        return Err(crate::types::Error::Validation {
            field: "server.request_timeout".to_string(),
            message: format!(
                "Request timeout ({} seconds) must be greater than deploy.timeout ({} seconds)",
                request_timeout, deploy_timeout
            ),
        });
    }
    Ok(())
}

/// Parse size string with units (KB, MB, GB) into bytes
pub(crate) fn parse_size_string(size: &str) -> Result<u64> {
    let size = size.trim().to_uppercase();

    let (number, multiplier) = if let Some(number) = size.strip_suffix("KB") {
        (number, 1024)
    } else if let Some(number) = size.strip_suffix("MB") {
        (number, 1024 * 1024)
    } else if let Some(number) = size.strip_suffix("GB") {
        (number, 1024 * 1024 * 1024)
    } else if let Some(number) = size.strip_suffix('B') {
        (number, 1)
    } else {
        (size.as_str(), 1)
    };

    number
        .trim()
        .parse::<u64>()
        .map(|n| n * multiplier)
        .map_err(|_| crate::types::Error::Validation {
            field: "size".to_string(),
            message: format!("Invalid size format '{}'. Expected format: number + unit (KB/MB/GB) or plain bytes", size),
        })
}

/// Validate request size string and ensure reasonable limits
pub(crate) fn validate_request_size(size: &str, field: &str) -> Result<()> {
    let bytes = parse_size_string(size).map_err(|mut e| {
        if let crate::types::Error::Validation {
            field: ref mut field_ref,
            ..
        } = e
        {
            *field_ref = field.to_string();
        }
        e
    })?;

    // Minimum 1KB, maximum 100MB
    const MIN_SIZE: u64 = 1024;
    const MAX_SIZE: u64 = 100 * 1024 * 1024;

    if bytes < MIN_SIZE {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!(
                "Request size {} bytes is below minimum {} (1KB)",
                bytes, MIN_SIZE
            ),
        });
    }

    if bytes > MAX_SIZE {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!(
                "Request size {} bytes exceeds maximum {} (100MB)",
                bytes, MAX_SIZE
            ),
        });
    }

    Ok(())
}

/// Validate a branch name against the git ref component rules that matter here
pub(crate) fn validate_branch_name(branch: &str, field: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._/-]*$").map_err(|e| {
        crate::types::Error::Application(format!("Invalid branch pattern: {}", e))
    })?;

    let invalid = !pattern.is_match(branch)
        || branch.contains("..")
        || branch.contains("//")
        || branch.ends_with('/')
        || branch.ends_with('.')
        || branch.ends_with(".lock");

    if invalid {
        return Err(crate::types::Error::Validation {
            field: field.to_string(),
            message: format!("Invalid branch name '{}'", branch),
        });
    }
    Ok(())
}

impl SystemConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate server configuration
        validate_listen_address(&self.server.listen)?;
        validate_route_path(&self.server.webhook_path, "server.webhook_path")?;
        validate_request_size(&self.server.max_request_size, "server.max_request_size")?;
        validate_positive_timeout(self.server.request_timeout, "server.request_timeout")?;
        validate_positive_timeout(self.server.shutdown_timeout, "server.shutdown_timeout")?;

        // Validate deploy configuration
        validate_branch_name(&self.deploy.branch, "deploy.branch")?;
        validate_positive_timeout(self.deploy.timeout, "deploy.timeout")?;
        validate_timeout_relationship(self.server.request_timeout, self.deploy.timeout)?;
        if self.deploy.script.as_os_str().is_empty() {
            return Err(crate::types::Error::Validation {
                field: "deploy.script".to_string(),
                message: "Deployment script path cannot be empty".to_string(),
            });
        }

        // Validate auth configuration
        if self.auth.mode == AuthModeKind::Signed {
            crate::secrets::load_first(&self.auth.secret_loaders()).map_err(|e| {
                crate::types::Error::Validation {
                    field: "auth.secret".to_string(),
                    message: format!("Signed mode requires a webhook secret: {}", e),
                }
            })?;
        } else if self.auth.user_agent_marker.trim().is_empty() {
            return Err(crate::types::Error::Validation {
                field: "auth.user_agent_marker".to_string(),
                message: "User agent marker cannot be empty in permissive mode".to_string(),
            });
        }

        // Validate logging configuration
        if !logging::level::ALL.contains(&self.logging.level.as_str()) {
            return Err(crate::types::Error::Validation {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ),
            });
        }

        if !logging::format::ALL.contains(&self.logging.format.as_str()) {
            return Err(crate::types::Error::Validation {
                field: "logging.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Must be one of: json, pretty",
                    self.logging.format
                ),
            });
        }

        // Validate monitoring configuration
        validate_route_path(&self.monitoring.metrics_path, "monitoring.metrics_path")?;
        validate_route_path(&self.monitoring.health_path, "monitoring.health_path")?;
        let mut paths = vec![&self.server.webhook_path, &self.monitoring.health_path];
        if self.monitoring.metrics_enabled {
            paths.push(&self.monitoring.metrics_path);
        }
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        if unique.len() != paths.len() {
            return Err(crate::types::Error::Validation {
                field: "server.webhook_path".to_string(),
                message: "Webhook, health and metrics paths must be distinct".to_string(),
            });
        }

        Ok(())
    }
}
