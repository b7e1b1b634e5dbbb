//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route definitions (well formed, unique, at least one)
//! - Validate bind addresses and that at least one listener is enabled
//! - Validate value ranges (timeouts > 0, probe path absolute)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{AddrParseError, SocketAddr};

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::routing::{RouteError, RouteTable};

/// A single semantic problem with the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    Route(#[from] RouteError),

    #[error("invalid {field} {value:?}")]
    BindAddress { field: &'static str, value: String },

    #[error("both listeners are disabled")]
    NoListener,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("prober path {0:?} must start with /")]
    ProbePath(String),

    #[error("secret is not a valid header value")]
    Secret,
}

/// Parse a bind address. Empty disables the listener, `:port` binds all interfaces.
pub fn parse_bind(value: &str) -> Result<Option<SocketAddr>, AddrParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if value.starts_with(':') {
        return format!("0.0.0.0{}", value).parse().map(Some);
    }
    value.parse().map(Some)
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = RouteTable::from_definitions(&config.routes) {
        errors.push(e.into());
    }

    let listeners = [
        ("listener.bind_address", &config.listener.bind_address),
        ("listener.tls_bind_address", &config.listener.tls_bind_address),
    ];
    let mut enabled = 0;
    for (field, value) in listeners {
        match parse_bind(value) {
            Ok(Some(_)) => enabled += 1,
            Ok(None) => {}
            Err(_) => errors.push(ValidationError::BindAddress {
                field,
                value: value.clone(),
            }),
        }
    }
    if enabled == 0 && errors.iter().all(|e| !matches!(e, ValidationError::BindAddress { .. })) {
        errors.push(ValidationError::NoListener);
    }

    if let Some(addr) = &config.observability.metrics_address {
        if !matches!(parse_bind(addr), Ok(Some(_))) {
            errors.push(ValidationError::BindAddress {
                field: "observability.metrics_address",
                value: addr.clone(),
            });
        }
    }

    let timeouts = [
        ("origin.connect_timeout_secs", config.origin.connect_timeout_secs),
        ("origin.response_header_timeout_secs", config.origin.response_header_timeout_secs),
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
        ("listener.read_timeout_secs", config.listener.read_timeout_secs),
        ("listener.write_timeout_secs", config.listener.write_timeout_secs),
        ("prober.interval_secs", config.prober.interval_secs),
        ("prober.timeout_secs", config.prober.timeout_secs),
    ];
    for (field, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if !config.prober.path.starts_with('/') {
        errors.push(ValidationError::ProbePath(config.prober.path.clone()));
    }

    if HeaderValue::from_str(&config.secret).is_err() {
        errors.push(ValidationError::Secret);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
