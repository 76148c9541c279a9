//! Webhook request pipeline
//!
//! Stages run in a fixed order and the first one that produces an
//! [`Outcome`] ends the request:
//!
//! 1. method check
//! 2. empty body check
//! 3. authentication
//! 4. JSON well-formedness
//! 5. event and branch filter
//! 6. deployment slot
//! 7. deployment script
//!
//! No script is started unless both the authenticator and the event filter
//! accepted the delivery. The final audit entry is the response message.

pub mod filter;
pub mod payload;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, Instrument, Span};

use crate::audit::{AuditSink, AuditTrail};
use crate::auth::{
    header_str, AuthDecision, AuthFailure, AuthMode, Authenticator, DELIVERY_HEADER, EVENT_HEADER,
};
use crate::config::{OverlapPolicy, Settings};
use crate::execution::DeploymentRunner;
use crate::http::responses::WebhookResponse;
use crate::metrics::{self, DeploymentMetricsGuard};
use crate::state::DeploymentSlot;
use crate::types::{ExecutionError, Outcome};

pub use filter::{EventFilter, FilterDecision};
pub use payload::ParsedPush;

/// One HTTP delivery as received, before any interpretation
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl InboundEvent {
    /// Sender-assigned delivery id, `unknown` when absent
    pub fn delivery_id(&self) -> &str {
        header_str(&self.headers, DELIVERY_HEADER).unwrap_or("unknown")
    }
}

/// Kept back from the request budget for the final audit entry and response
const RESPONSE_HEADROOM: Duration = Duration::from_millis(500);

pub struct WebhookPipeline {
    authenticator: Authenticator,
    filter: EventFilter,
    runner: DeploymentRunner,
    slot: DeploymentSlot,
    /// Longest a delivery may queue and still finish a full run in time
    queue_budget: Duration,
    sink: Arc<dyn AuditSink>,
}

impl WebhookPipeline {
    pub fn new(settings: Settings, sink: Arc<dyn AuditSink>) -> Self {
        let Settings {
            target_branch,
            script,
            working_dir,
            auth,
            deploy_timeout,
            request_timeout,
            on_overlap,
            ..
        } = settings;

        Self {
            authenticator: Authenticator::new(auth),
            filter: EventFilter::new(target_branch),
            runner: DeploymentRunner::new(script, working_dir, deploy_timeout),
            slot: DeploymentSlot::new(on_overlap),
            queue_budget: request_timeout
                .saturating_sub(deploy_timeout)
                .saturating_sub(RESPONSE_HEADROOM),
            sink,
        }
    }

    pub fn auth_mode(&self) -> &AuthMode {
        self.authenticator.mode()
    }

    pub fn slot(&self) -> &DeploymentSlot {
        &self.slot
    }

    /// Run one delivery through every stage and produce the response
    ///
    /// Once the deployment script has been started it runs to completion on
    /// its own task, even if the caller stops waiting for this future.
    pub async fn process(self: &Arc<Self>, event: InboundEvent) -> WebhookResponse {
        let received = Instant::now();
        let mut trail = AuditTrail::new(self.sink.clone());

        if let Err(outcome) = self.screen(&event, &mut trail) {
            return finish(trail, outcome);
        }

        let max_wait = self.queue_budget.saturating_sub(received.elapsed());
        let Some(guard) = self.slot.acquire(event.delivery_id(), max_wait).await else {
            if self.slot.policy() == OverlapPolicy::Queue {
                trail.warning(format!(
                    "Gave up after waiting {}ms for the running deployment",
                    max_wait.as_millis()
                ));
            }
            return finish(trail, Outcome::DeploymentInProgress);
        };

        let pipeline = Arc::clone(self);
        let deployment = tokio::spawn(
            async move {
                let outcome = pipeline.deploy(&mut trail).await;
                let response = finish(trail, outcome);
                drop(guard);
                response
            }
            .instrument(Span::current()),
        );

        match deployment.await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Deployment task did not complete");
                Outcome::DeploymentFailed { exit_code: None }.to_response()
            }
        }
    }

    /// Answer a delivery whose body was too large or could not be read
    pub fn refuse_body(&self, remote_addr: Option<SocketAddr>, outcome: Outcome) -> WebhookResponse {
        let mut trail = AuditTrail::new(self.sink.clone());
        trail.info(received_from(remote_addr));
        finish(trail, outcome)
    }

    /// Stages before the deployment slot; `Err` ends the request
    fn screen(&self, event: &InboundEvent, trail: &mut AuditTrail) -> Result<(), Outcome> {
        trail.info(received_from(event.remote_addr));

        if event.method != Method::POST {
            return Err(Outcome::MethodNotAllowed);
        }

        if event.body.is_empty() {
            return Err(Outcome::EmptyPayload);
        }

        match self.authenticator.authenticate(&event.headers, &event.body) {
            AuthDecision::Verified => trail.info("Webhook signature validated successfully"),
            AuthDecision::Recognized => debug!("User-Agent matches expected sender"),
            AuthDecision::Unrecognized { user_agent } => trail.warning(format!(
                "Unexpected User-Agent '{}', continuing without signature verification",
                user_agent
            )),
            AuthDecision::Rejected(AuthFailure::MissingSignature) => {
                return Err(Outcome::MissingSignature)
            }
            AuthDecision::Rejected(AuthFailure::InvalidSignature) => {
                return Err(Outcome::InvalidSignature)
            }
        }

        let value: Value = serde_json::from_slice(&event.body).map_err(|e| {
            debug!(error = %e, "Payload is not valid JSON");
            Outcome::InvalidPayload
        })?;
        let push = ParsedPush::from_value(&value);

        let event_type = header_str(&event.headers, EVENT_HEADER);
        let branch = match self.filter.evaluate(event_type, &push) {
            FilterDecision::Deploy { branch } => branch,
            FilterDecision::IgnoreEvent { event } => return Err(Outcome::EventIgnored { event }),
            FilterDecision::IgnoreBranch { branch } => {
                return Err(Outcome::BranchIgnored {
                    branch,
                    target: self.filter.target_branch().to_string(),
                })
            }
        };

        trail.info(format!("Push event detected on branch '{}'", branch));
        debug!(repository = %push.repository, commit = %push.commit_id, "Push accepted");
        trail.info(push.summary());

        Ok(())
    }

    async fn deploy(&self, trail: &mut AuditTrail) -> Outcome {
        match self.runner.prepare().await {
            Ok(_) => {}
            Err(ExecutionError::ScriptNotFound { .. }) => return Outcome::ScriptNotFound,
            Err(e) => {
                trail.error(format!("Deployment script could not be prepared: {}", e));
                return Outcome::DeploymentFailed { exit_code: None };
            }
        }

        trail.info("Executing deployment script...");
        let _in_progress = DeploymentMetricsGuard::new();
        let started = Instant::now();

        match self.runner.run().await {
            Ok(run) => {
                trail.info(format!("Deployment output:\n{}", run.output));
                if run.succeeded() {
                    metrics::record_deployment("succeeded", run.duration);
                    trail.info("Deployment completed successfully");
                    Outcome::Deployed
                } else {
                    metrics::record_deployment("failed", run.duration);
                    match run.exit_code {
                        Some(code) => {
                            trail.error(format!("Deployment failed with exit code: {}", code))
                        }
                        None => trail.error("Deployment failed: script was terminated by a signal"),
                    }
                    Outcome::DeploymentFailed {
                        exit_code: run.exit_code,
                    }
                }
            }
            Err(ExecutionError::Timeout {
                timeout, output, ..
            }) => {
                metrics::record_deployment("timed_out", started.elapsed());
                trail.info(format!("Deployment output:\n{}", output));
                trail.error(format!(
                    "Deployment timed out after {}s and was terminated",
                    timeout.as_secs()
                ));
                Outcome::DeploymentTimedOut
            }
            Err(e) => {
                metrics::record_deployment("error", started.elapsed());
                trail.error(format!("Deployment script could not be run: {}", e));
                Outcome::DeploymentFailed { exit_code: None }
            }
        }
    }
}

fn received_from(remote_addr: Option<SocketAddr>) -> String {
    let peer = remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("Webhook received from IP: {}", peer)
}

/// Record the final audit entry and build the response from it
fn finish(mut trail: AuditTrail, outcome: Outcome) -> WebhookResponse {
    metrics::record_webhook(&outcome);
    let status = outcome.status_code().as_u16();
    let entry = trail.record(outcome.audit_level(), outcome.message());
    WebhookResponse::new(status, entry.message.clone())
}
