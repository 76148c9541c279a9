//! Response policy and JSON response bodies
//!
//! Every pipeline [`Outcome`] maps to exactly one status code, message and
//! audit level. The JSON body always repeats the HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::audit::AuditLevel;
use crate::types::Outcome;

/// `{"status": <code>, "message": <text>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    pub message: String,
}

impl WebhookResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub deployment_in_progress: bool,
}

impl Outcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Outcome::EmptyPayload | Outcome::UnreadableBody | Outcome::InvalidPayload => {
                StatusCode::BAD_REQUEST
            }
            Outcome::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Outcome::MissingSignature | Outcome::InvalidSignature => StatusCode::FORBIDDEN,
            Outcome::EventIgnored { .. } | Outcome::BranchIgnored { .. } | Outcome::Deployed => {
                StatusCode::OK
            }
            Outcome::DeploymentInProgress => StatusCode::TOO_MANY_REQUESTS,
            Outcome::ScriptNotFound
            | Outcome::DeploymentFailed { .. }
            | Outcome::DeploymentTimedOut => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message; never carries script output or paths
    pub fn message(&self) -> String {
        match self {
            Outcome::MethodNotAllowed => {
                "Method not allowed. Only POST requests are accepted.".to_string()
            }
            Outcome::EmptyPayload => "Empty payload received.".to_string(),
            Outcome::PayloadTooLarge => "Payload too large.".to_string(),
            Outcome::UnreadableBody => "Request body could not be read.".to_string(),
            Outcome::MissingSignature => "Missing X-Hub-Signature-256 header.".to_string(),
            Outcome::InvalidSignature => {
                "Invalid signature. Webhook authentication failed.".to_string()
            }
            Outcome::InvalidPayload => "Invalid JSON payload.".to_string(),
            Outcome::EventIgnored { .. } => {
                "Event ignored. Only push events trigger deployment.".to_string()
            }
            Outcome::BranchIgnored { branch, target } => format!(
                "Branch '{}' ignored. Only '{}' branch triggers deployment.",
                branch, target
            ),
            Outcome::DeploymentInProgress => {
                "Deployment already in progress. Try again later.".to_string()
            }
            Outcome::ScriptNotFound => "Deployment script not found.".to_string(),
            Outcome::DeploymentFailed { .. } => {
                "Deployment failed. Check logs for details.".to_string()
            }
            Outcome::DeploymentTimedOut => {
                "Deployment timed out. Check logs for details.".to_string()
            }
            Outcome::Deployed => "Deployment successful!".to_string(),
        }
    }

    pub fn audit_level(&self) -> AuditLevel {
        let status = self.status_code();
        if status == StatusCode::TOO_MANY_REQUESTS {
            AuditLevel::Warning
        } else if status.is_client_error() || status.is_server_error() {
            AuditLevel::Error
        } else {
            AuditLevel::Info
        }
    }

    pub fn to_response(&self) -> WebhookResponse {
        WebhookResponse::new(self.status_code().as_u16(), self.message())
    }
}
