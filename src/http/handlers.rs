//! HTTP endpoint handlers
//!
//! The webhook handler only turns the HTTP request into an [`InboundEvent`];
//! every decision is taken by the [`WebhookPipeline`].

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use http_body_util::LengthLimitError;
use std::{error::Error as _, net::SocketAddr, sync::Arc, time::Instant};
use tracing::{warn, Instrument};

use crate::{
    http::responses::{HealthResponse, WebhookResponse},
    logging,
    types::Outcome,
    webhook::{InboundEvent, WebhookPipeline},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<WebhookPipeline>,
    pub start_time: Instant,
    pub max_request_size: usize,
}

/// ANY <webhook_path> - Receive a push notification
pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> WebhookResponse {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_request_size).await {
        Ok(body) => body,
        Err(e) if exceeded_length_limit(&e) => {
            warn!(max_request_size = state.max_request_size, "Webhook body too large");
            return state
                .pipeline
                .refuse_body(remote_addr, Outcome::PayloadTooLarge);
        }
        Err(e) => {
            warn!(error = %e, "Failed to read webhook body");
            return state
                .pipeline
                .refuse_body(remote_addr, Outcome::UnreadableBody);
        }
    };

    let event = InboundEvent {
        method: parts.method,
        headers: parts.headers,
        body,
        remote_addr,
    };

    let span = logging::webhook_span(event.delivery_id());
    state.pipeline.process(event).instrument(span).await
}

fn exceeded_length_limit(error: &axum::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// GET <health_path> - Liveness and current deployment state
pub async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        deployment_in_progress: state.pipeline.slot().in_progress(),
    })
}

/// GET <metrics_path> - Prometheus metrics endpoint
pub async fn handle_metrics() -> Result<impl IntoResponse, StatusCode> {
    match crate::metrics::gather_metrics() {
        Ok(metrics_text) => Ok((
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics_text,
        )),
        Err(e) => {
            warn!(error = %e, "Failed to gather Prometheus metrics");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Fallback handler for 404 Not Found
pub async fn handle_not_found() -> WebhookResponse {
    WebhookResponse::new(StatusCode::NOT_FOUND.as_u16(), "Endpoint not found")
}
