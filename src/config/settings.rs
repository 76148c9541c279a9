//! Immutable runtime settings derived from the validated configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{AuthConfig, AuthModeKind, OverlapPolicy, SystemConfig};
use crate::auth::AuthMode;
use crate::secrets::{self, EnvVarSecretLoader, FileSecretLoader, InlineSecretLoader, SecretLoader};
use crate::types::Result;

/// Everything the request pipeline needs, resolved once at startup
#[derive(Debug)]
pub struct Settings {
    pub target_branch: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub audit_log: PathBuf,
    pub auth: AuthMode,
    pub deploy_timeout: Duration,
    /// Whole-request budget enforced by the HTTP layer
    pub request_timeout: Duration,
    pub on_overlap: OverlapPolicy,
}

impl Settings {
    /// Resolve secrets and defaults from a validated configuration
    pub fn from_config(config: &SystemConfig) -> Result<Self> {
        let working_dir = match &config.deploy.working_dir {
            Some(dir) => dir.clone(),
            None => config
                .deploy
                .script
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        Ok(Self {
            target_branch: config.deploy.branch.clone(),
            script: config.deploy.script.clone(),
            working_dir,
            audit_log: config.audit.log_file.clone(),
            auth: config.auth.resolve_mode()?,
            deploy_timeout: Duration::from_secs(config.deploy.timeout),
            request_timeout: Duration::from_secs(config.server.request_timeout),
            on_overlap: config.deploy.on_overlap,
        })
    }
}

impl AuthConfig {
    /// Secret sources in precedence order: inline, environment, file
    pub fn secret_loaders(&self) -> Vec<Box<dyn SecretLoader>> {
        let mut loaders: Vec<Box<dyn SecretLoader>> = Vec::new();
        if self.secret.is_some() {
            loaders.push(Box::new(InlineSecretLoader::new(self.secret.clone())));
        }
        if let Some(variable) = &self.secret_env {
            loaders.push(Box::new(EnvVarSecretLoader::new(variable.clone())));
        }
        if let Some(file) = &self.secret_file {
            loaders.push(Box::new(FileSecretLoader::new(file)));
        }
        loaders
    }

    /// Build the authentication mode, loading the secret when one is needed
    pub fn resolve_mode(&self) -> Result<AuthMode> {
        match self.mode {
            AuthModeKind::Signed => Ok(AuthMode::Signed {
                secret: secrets::load_first(&self.secret_loaders())?,
            }),
            AuthModeKind::Permissive => Ok(AuthMode::Permissive {
                user_agent_marker: self.user_agent_marker.clone(),
            }),
        }
    }
}
