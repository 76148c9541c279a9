//! Secret loader implementations for different sources

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::{SecretError, SecretString};
use crate::types::Result;

/// A single place the webhook secret may come from
pub trait SecretLoader: Send + Sync {
    /// Load the secret, returning None if this source does not provide one
    fn load_secret(&self) -> Result<Option<SecretString>>;

    /// Get the name of this loader for logging
    fn name(&self) -> &'static str;
}

/// Secret written directly into the configuration file
pub struct InlineSecretLoader {
    value: Option<String>,
}

impl InlineSecretLoader {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }
}

impl SecretLoader for InlineSecretLoader {
    fn load_secret(&self) -> Result<Option<SecretString>> {
        Ok(self.value.clone().map(SecretString::new))
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Environment variable secret loader
pub struct EnvVarSecretLoader {
    variable: String,
}

impl EnvVarSecretLoader {
    pub fn new(variable: String) -> Self {
        Self { variable }
    }
}

impl SecretLoader for EnvVarSecretLoader {
    fn load_secret(&self) -> Result<Option<SecretString>> {
        match env::var(&self.variable) {
            Ok(value) => {
                trace!(variable = %self.variable, "Found webhook secret in environment");
                Ok(Some(SecretString::new(value)))
            }
            Err(env::VarError::NotPresent) => Ok(None),
            Err(env::VarError::NotUnicode(_)) => {
                Err(SecretError::InvalidEnvValue(self.variable.clone()).into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// File containing only the secret; surrounding whitespace is trimmed
pub struct FileSecretLoader {
    file_path: PathBuf,
}

impl FileSecretLoader {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }
}

impl SecretLoader for FileSecretLoader {
    fn load_secret(&self) -> Result<Option<SecretString>> {
        let content = std::fs::read_to_string(&self.file_path).map_err(|e| {
            SecretError::FileReadError(self.file_path.display().to_string(), e.to_string())
        })?;
        trace!(path = %self.file_path.display(), "Read webhook secret from file");
        Ok(Some(SecretString::new(content.trim().to_string())))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Return the secret from the first loader that provides one
///
/// An empty value is an error rather than a fallthrough: an operator who
/// configured a source expects it to be used.
pub fn load_first(loaders: &[Box<dyn SecretLoader>]) -> Result<SecretString> {
    for loader in loaders {
        if let Some(secret) = loader.load_secret()? {
            if secret.is_empty() {
                return Err(SecretError::EmptySecret(loader.name()).into());
            }
            debug!(source = loader.name(), "Webhook secret loaded");
            return Ok(secret);
        }
    }

    let tried = loaders
        .iter()
        .map(|l| l.name())
        .collect::<Vec<_>>()
        .join(", ");
    Err(SecretError::SecretNotFound(if tried.is_empty() {
        "none".to_string()
    } else {
        tried
    })
    .into())
}
