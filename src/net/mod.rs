//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → plaintext listener (axum::serve, HTTP/1.1 + h2c)
//!     → TLS listener (axum-server, tls.rs certificate loading, ALPN h2/http1.1)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bind failures and unreadable certificates are fatal at startup
//! - TLS is terminated here; origins see a fresh upstream connection

pub mod tls;
