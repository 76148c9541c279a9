//! HTTP server setup and configuration
//!
//! This module provides the main server startup logic, routing configuration,
//! and graceful shutdown handling for the webhook receiver.

use axum::{
    routing::{any, get},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration, time::Instant};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, instrument};

use crate::{
    audit::FileAuditSink,
    config::{parse_size_string, Settings, SystemConfig},
    http::handlers::*,
    types::Result,
    webhook::WebhookPipeline,
};

const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Start the HTTP server with the given configuration
#[instrument(skip_all)]
pub async fn start_server(
    system_config: SystemConfig,
    settings: Settings,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let audit_sink = FileAuditSink::open(&settings.audit_log)?;
    let audit_log = audit_sink.path().display().to_string();

    let pipeline = Arc::new(WebhookPipeline::new(settings, Arc::new(audit_sink)));
    info!(
        audit_log = %audit_log,
        auth_mode = pipeline.auth_mode().name(),
        on_overlap = ?pipeline.slot().policy(),
        "Webhook pipeline ready"
    );
    let app_state = Arc::new(AppState {
        pipeline,
        start_time: Instant::now(),
        max_request_size: max_request_size(&system_config),
    });

    let router = create_router(app_state, &system_config);

    let addr = parse_listen_address(&system_config.server.listen)?;

    info!(
        listen_addr = %addr,
        webhook_path = %system_config.server.webhook_path,
        max_request_size = %system_config.server.max_request_size,
        request_timeout = system_config.server.request_timeout,
        "Starting HTTP server"
    );

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(
            error = %e,
            addr = %addr,
            "Failed to bind to address"
        );
        crate::types::Error::Io(e)
    })?;

    info!(
        local_addr = %listener.local_addr().unwrap_or(addr),
        "HTTP server listening"
    );

    let shutdown_timeout = Duration::from_secs(system_config.server.shutdown_timeout);
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal.await;
        info!("Shutdown signal received, starting graceful shutdown");
        let _ = drain_tx.send(());
    });

    // In-flight requests get `shutdown_timeout` to finish once draining starts
    let drain_deadline = async move {
        if drain_rx.await.is_ok() {
            tokio::time::sleep(shutdown_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
                return Err(crate::types::Error::Io(e));
            }
        }
        _ = drain_deadline => {
            error!(
                shutdown_timeout_secs = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, abandoning in-flight requests"
            );
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Create the Axum router with all endpoints and middleware
pub(crate) fn create_router(app_state: Arc<AppState>, config: &SystemConfig) -> Router {
    // Every method reaches the webhook handler so that rejections are audited
    let router = Router::new()
        .route(&config.server.webhook_path, any(handle_webhook))
        .route(&config.monitoring.health_path, get(handle_health));

    let router = if config.monitoring.metrics_enabled {
        router.route(&config.monitoring.metrics_path, get(handle_metrics))
    } else {
        router
    };

    router
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout,
        )))
        .with_state(app_state)
}

fn max_request_size(config: &SystemConfig) -> usize {
    parse_size_string(&config.server.max_request_size)
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_MAX_REQUEST_SIZE)
}

/// Parse the listen address from configuration
fn parse_listen_address(listen: &str) -> Result<SocketAddr> {
    listen.parse().map_err(|e| {
        error!(
            listen_addr = %listen,
            error = %e,
            "Invalid listen address format"
        );
        crate::types::Error::Config(crate::types::ConfigError::Invalid {
            message: format!("Invalid listen address '{}': {}", listen, e),
        })
    })
}
