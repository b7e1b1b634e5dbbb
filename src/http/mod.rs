//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, listeners, health endpoint)
//!     → forwarder.rs (host → origin client, attempts, 400/502)
//!     → request.rs (rewrite target, inject caller identity)
//!     → [origin client sends over HTTP/2]
//!     → response.rs (strip transport headers, gzip repair)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{ForwardError, Forwarder, MAX_ATTEMPTS};
pub use server::{build_router, EdgeServer, ServerError, HEALTHCHECK_PATH};
