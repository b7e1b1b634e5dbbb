//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Edge listeners (plaintext and TLS).
    pub listener: ListenerConfig,

    /// Upstream transport settings.
    pub origin: OriginConfig,

    /// Background liveness probing.
    pub prober: ProberConfig,

    /// Request forwarding settings.
    pub forwarder: ForwarderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shared secret sent to origins so they can recognise gateway traffic.
    pub secret: String,

    /// `domain:origin` definitions, one per public domain.
    pub routes: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            origin: OriginConfig::default(),
            prober: ProberConfig::default(),
            forwarder: ForwarderConfig::default(),
            observability: ObservabilityConfig::default(),
            secret: "secret".to_string(),
            routes: Vec::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g. ":8000"); empty disables it.
    pub bind_address: String,

    /// TLS bind address (e.g. ":44300"); empty disables it.
    pub tls_bind_address: String,

    /// Certificate material for the TLS listener.
    pub tls: TlsConfig,

    /// Deadline for the handler to produce response headers, in seconds.
    pub request_timeout_secs: u64,

    /// Idle deadline while reading a request body, in seconds.
    pub read_timeout_secs: u64,

    /// Idle deadline while writing a response body, in seconds.
    pub write_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8000".to_string(),
            tls_bind_address: ":44300".to_string(),
            tls: TlsConfig::default(),
            request_timeout_secs: 30,
            read_timeout_secs: 5,
            write_timeout_secs: 5,
        }
    }
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "server.crt".to_string(),
            key_path: "server.key".to_string(),
        }
    }
}

/// Upstream transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Use the upgraded transport (one multiplexed HTTP/2 connection per
    /// origin). When false, origins are reached over pooled HTTP/1.1.
    pub upgrade: bool,

    /// Talk to origins without TLS (h2c prior knowledge, or plain HTTP/1.1).
    pub plaintext: bool,

    /// Extra PEM trust roots for origin certificates.
    pub ca_path: Option<String>,

    /// TCP + TLS + HTTP/2 handshake timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Time allowed for response headers of one attempt, in seconds.
    pub response_header_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            upgrade: true,
            plaintext: false,
            ca_path: None,
            connect_timeout_secs: 5,
            response_header_timeout_secs: 5,
        }
    }
}

impl OriginConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_header_timeout(&self) -> Duration {
        Duration::from_secs(self.response_header_timeout_secs)
    }
}

/// Liveness probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProberConfig {
    /// Run the periodic sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Path requested with HEAD on the cached connection.
    pub path: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            timeout_secs: 5,
            path: "/".to_string(),
        }
    }
}

impl ProberConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// Largest request body (bytes) buffered so it can be replayed on retry.
    pub retry_body_limit: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            retry_body_limit: 1024 * 1024, // 1MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    /// Prometheus endpoint bind address; unset disables the exporter.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}
