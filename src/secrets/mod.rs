//! Webhook secret loading
//!
//! The shared HMAC secret can come from one of three places:
//! - an inline value in the configuration file
//! - an environment variable
//! - a file containing only the secret
//!
//! Loaded values are wrapped in [`SecretString`], which zeroizes its buffer on
//! drop and never prints its contents through `Debug`.

pub mod loader;
pub mod storage;

pub use loader::{load_first, EnvVarSecretLoader, FileSecretLoader, InlineSecretLoader, SecretLoader};
pub use storage::SecretString;

use crate::types::{ConfigError, Error};

/// Errors specific to secret loading operations
#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error("Secret not found in any configured source (tried: {0})")]
    SecretNotFound(String),

    #[error("Secret from source '{0}' is empty")]
    EmptySecret(&'static str),

    #[error("Failed to read secrets file '{0}': {1}")]
    FileReadError(String, String),

    #[error("Environment variable '{0}' contains invalid UTF-8")]
    InvalidEnvValue(String),
}

impl From<SecretError> for Error {
    fn from(err: SecretError) -> Self {
        Error::Config(ConfigError::Invalid {
            message: err.to_string(),
        })
    }
}
