//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Honour `RUST_LOG`, falling back to the configured level
//! - Hold the request log line format in one place

use std::net::IpAddr;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("edge_gateway={},tower_http=warn", default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// One line per handled request.
///
/// `status` is `None` when no origin response was obtained and renders as `---`.
pub fn request_line(
    remote: IpAddr,
    transport: &str,
    status: Option<StatusCode>,
    method: &Method,
    url: &str,
    elapsed: Duration,
) {
    let status = status.map_or_else(|| "---".to_string(), |s| s.as_u16().to_string());
    tracing::info!(
        remote = %remote,
        transport,
        status = %status,
        method = %method,
        url,
        elapsed_ms = format_args!("{:.3}", elapsed.as_secs_f64() * 1000.0),
        "request"
    );
}

/// Request that ended without an origin response.
pub fn rejected_line(
    remote: IpAddr,
    transport: &str,
    method: &Method,
    url: &str,
    error: &dyn std::fmt::Display,
    elapsed: Duration,
) {
    tracing::warn!(
        remote = %remote,
        transport,
        status = "---",
        method = %method,
        url,
        elapsed_ms = format_args!("{:.3}", elapsed.as_secs_f64() * 1000.0),
        error = %error,
        "request"
    );
}
