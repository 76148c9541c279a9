use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{ConfigError, Result};

/// System configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub deploy: DeployConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

/// Which trust strategy the authenticator applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthModeKind {
    /// HMAC-SHA256 signature over the raw body
    Signed,
    /// User-agent check only; a mismatch is logged and the request proceeds
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthModeKind,
    pub secret: Option<String>,
    pub secret_env: Option<String>,
    pub secret_file: Option<PathBuf>,
    #[serde(default = "default_user_agent_marker")]
    pub user_agent_marker: String,
}

/// What to do with a qualifying push while a deployment is still running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Answer 429 immediately
    #[default]
    Reject,
    /// Wait for the running deployment, then run
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_branch")]
    pub branch: String,
    pub script: PathBuf,
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_deploy_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub on_overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_log_file")]
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl SystemConfig {
    /// Load system configuration from file
    ///
    /// Relative paths inside the file are resolved against the directory the
    /// file lives in.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::FileNotFound { path: path_str })?;

        let mut config: SystemConfig =
            toml::from_str(&content).map_err(ConfigError::ParseError)?;

        let base_dir = path
            .as_ref()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_relative_paths(&base_dir);

        Ok(config)
    }

    /// Anchor every relative path to `base_dir`
    pub fn resolve_relative_paths(&mut self, base_dir: &Path) {
        resolve(&mut self.deploy.script, base_dir);
        if let Some(dir) = self.deploy.working_dir.as_mut() {
            resolve(dir, base_dir);
        }
        resolve(&mut self.audit.log_file, base_dir);
        if let Some(file) = self.auth.secret_file.as_mut() {
            resolve(file, base_dir);
        }
    }
}

fn resolve(path: &mut PathBuf, base_dir: &Path) {
    if path.is_relative() {
        *path = base_dir.join(&*path);
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            webhook_path: default_webhook_path(),
            max_request_size: default_max_request_size(),
            request_timeout: default_request_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: default_audit_log_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
            metrics_path: default_metrics_path(),
            health_path: default_health_path(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_webhook_path() -> String {
    "/deploy".to_string()
}

fn default_max_request_size() -> String {
    "1MB".to_string()
}

fn default_request_timeout() -> u64 {
    660 // seconds, must stay above the deploy timeout
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_user_agent_marker() -> String {
    "GitHub-Hookshot".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_deploy_timeout() -> u64 {
    600
}

fn default_audit_log_file() -> PathBuf {
    PathBuf::from("deploy.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}
