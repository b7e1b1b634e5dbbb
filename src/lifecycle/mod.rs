//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse CLI/config → Validate → Build origin pool → Start prober → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Listeners stop accepting → Prober exits → Process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then origins, then listeners
//! - Fail fast: any startup error is fatal

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
