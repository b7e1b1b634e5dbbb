//! Origin subsystem: the transport to internal origin hosts.
//!
//! # Data Flow
//! ```text
//! Forwarder / Prober
//!     → pool.rs (domain → OriginClient)
//!     → client.rs (cached connection, lazy dial, invalidation)
//!     → connector.rs (TCP → TLS/ALPN h2 → HTTP/2 handshake)
//!       or http1.rs (pooled HTTP/1.1 when the upgrade is off)
//!     → origin host
//! ```
//!
//! # Design Decisions
//! - One multiplexed HTTP/2 connection per origin, shared by all requests
//! - A failed connection is discarded, the next use dials a fresh one
//! - No backoff and no cap on redials; every failure is local to one attempt
//! - The transport sits behind `Connector`/`OriginConnection` so tests can
//!   substitute in-memory origins

pub mod client;
pub mod connector;
pub mod http1;
pub mod pool;
pub mod tls;

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use thiserror::Error;

use crate::routing::Route;

pub use client::{OriginClient, ProbeOutcome};
pub use connector::H2Connector;
pub use http1::Http1Connector;
pub use pool::OriginPool;

/// Transport-level failure of one origin exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Origin host could not be turned into a dialable address.
    #[error("invalid origin target {0}")]
    InvalidTarget(String),

    /// TCP connect failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake failed or did not negotiate h2.
    #[error("TLS with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    /// HTTP/2 connection preface/settings exchange failed.
    #[error("HTTP/2 handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    /// Stream reset, protocol error or connection loss mid-request.
    #[error("origin request failed: {0}")]
    Request(#[source] hyper::Error),

    /// HTTP/1.1 exchange failed, dialing included.
    #[error("origin request failed: {0}")]
    Client(#[source] hyper_util::client::legacy::Error),

    /// Exchange did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is already shut down.
    #[error("connection closed")]
    Closed,
}

/// An established session with one origin.
#[async_trait]
pub trait OriginConnection: Send + Sync {
    /// Perform one request/response exchange. Redirects are never followed.
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;

    /// Lightweight liveness exchange.
    async fn ping(&self) -> Result<(), TransportError>;

    /// True once the underlying session can no longer carry requests.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Dials origins.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, route: &Route) -> Result<Box<dyn OriginConnection>, TransportError>;
}
