//! HTTP surface of the webhook receiver
//!
//! Endpoints (paths are configurable):
//! - ANY /deploy - Webhook deliveries; non-POST methods get a JSON 405
//! - GET /health - Health check endpoint
//! - GET /metrics - Prometheus metrics (when enabled)

pub mod handlers;
pub mod responses;
pub mod server;

pub use server::start_server;
