use std::time::Duration;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Validation failed: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Application error: {0}")]
    Application(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config file parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Deployment script execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Deployment script not found at {path}")]
    ScriptNotFound { path: String },

    #[error("Could not make deployment script {path} executable: {source}")]
    PermissionFix {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deployment script {path} could not be started: {source}")]
    StartFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Waiting for deployment script {path} failed: {source}")]
    WaitFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deployment script {path} timed out after {}s", .timeout.as_secs())]
    Timeout {
        path: String,
        timeout: Duration,
        output: String,
    },
}

/// Type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// What the pipeline decided for one inbound delivery.
///
/// Every request ends in exactly one of these; the response policy in
/// `http::responses` turns it into a status code, a message and an audit level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    MethodNotAllowed,
    EmptyPayload,
    PayloadTooLarge,
    UnreadableBody,
    MissingSignature,
    InvalidSignature,
    InvalidPayload,
    EventIgnored { event: Option<String> },
    BranchIgnored { branch: String, target: String },
    DeploymentInProgress,
    ScriptNotFound,
    DeploymentFailed { exit_code: Option<i32> },
    DeploymentTimedOut,
    Deployed,
}

impl Outcome {
    /// Stable label used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::MethodNotAllowed => "method_not_allowed",
            Outcome::EmptyPayload => "empty_payload",
            Outcome::PayloadTooLarge => "payload_too_large",
            Outcome::UnreadableBody => "unreadable_body",
            Outcome::MissingSignature => "missing_signature",
            Outcome::InvalidSignature => "invalid_signature",
            Outcome::InvalidPayload => "invalid_payload",
            Outcome::EventIgnored { .. } => "event_ignored",
            Outcome::BranchIgnored { .. } => "branch_ignored",
            Outcome::DeploymentInProgress => "deployment_in_progress",
            Outcome::ScriptNotFound => "script_not_found",
            Outcome::DeploymentFailed { .. } => "deployment_failed",
            Outcome::DeploymentTimedOut => "deployment_timed_out",
            Outcome::Deployed => "deployed",
        }
    }
}
