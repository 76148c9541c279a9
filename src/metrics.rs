//! Prometheus metrics for webhook handling and deployments
//!
//! Metrics are created once in a global registry and exposed in text format
//! on the configured metrics path.

use lazy_static::lazy_static;
use prometheus::{
    opts, Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::Outcome;

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Webhook deliveries by final outcome
    /// Labels: outcome (deployed, branch_ignored, invalid_signature, ...)
    pub static ref WEBHOOK_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("webhook_requests_total", "Total number of webhook deliveries"),
        &["outcome"]
    )
    .expect("Failed to create webhook_requests_total metric");

    /// Deployment script runs by result
    /// Labels: result (succeeded, failed, timed_out, error)
    pub static ref DEPLOYMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("deployments_total", "Total number of deployment script runs"),
        &["result"]
    )
    .expect("Failed to create deployments_total metric");

    /// Deployment script run time, 1s to 30min
    pub static ref DEPLOYMENT_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "deployment_duration_seconds",
            "Time spent running the deployment script"
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0])
    )
    .expect("Failed to create deployment_duration_seconds metric");

    /// 1 while a deployment script is running
    pub static ref DEPLOYMENT_IN_PROGRESS: IntGauge = IntGauge::with_opts(
        opts!("deployment_in_progress", "Whether a deployment is currently running")
    )
    .expect("Failed to create deployment_in_progress metric");
}

static INIT: Once = Once::new();

/// Register all metrics with the global registry
///
/// Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(WEBHOOK_REQUESTS_TOTAL.clone()),
            Box::new(DEPLOYMENTS_TOTAL.clone()),
            Box::new(DEPLOYMENT_DURATION_SECONDS.clone()),
            Box::new(DEPLOYMENT_IN_PROGRESS.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!(error = %e, "Failed to register metric");
            }
        }
        debug!("Prometheus metrics registry initialized");
    });
}

/// Count a finished webhook delivery
pub fn record_webhook(outcome: &Outcome) {
    WEBHOOK_REQUESTS_TOTAL
        .with_label_values(&[outcome.label()])
        .inc();
}

/// Record a completed or aborted deployment script run
pub fn record_deployment(result: &str, duration: Duration) {
    DEPLOYMENTS_TOTAL.with_label_values(&[result]).inc();
    DEPLOYMENT_DURATION_SECONDS.observe(duration.as_secs_f64());

    debug!(
        result = %result,
        duration_ms = duration.as_millis() as u64,
        "Recorded deployment metric"
    );
}

/// Gather all metrics and encode them in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}

/// Guard that holds the in-progress gauge at 1 while alive
pub struct DeploymentMetricsGuard;

impl DeploymentMetricsGuard {
    pub fn new() -> Self {
        DEPLOYMENT_IN_PROGRESS.inc();
        Self
    }
}

impl Drop for DeploymentMetricsGuard {
    fn drop(&mut self) {
        DEPLOYMENT_IN_PROGRESS.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_record_webhook() {
        let before = WEBHOOK_REQUESTS_TOTAL
            .with_label_values(&["branch_ignored"])
            .get();
        record_webhook(&Outcome::BranchIgnored {
            branch: "dev".to_string(),
            target: "main".to_string(),
        });
        let after = WEBHOOK_REQUESTS_TOTAL
            .with_label_values(&["branch_ignored"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_deployment_metrics_guard() {
        {
            let _guard = DeploymentMetricsGuard::new();
            // Guard increments gauge
        }
        // Guard decrements gauge on drop
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics();
        record_deployment("succeeded", Duration::from_millis(1500));
        record_webhook(&Outcome::Deployed);

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("deployments_total"));
        assert!(metrics_text.contains("webhook_requests_total"));
        assert!(metrics_text.contains("deployment_duration_seconds"));
        assert!(metrics_text.contains("# HELP"));
        assert!(metrics_text.contains("# TYPE"));
    }
}
