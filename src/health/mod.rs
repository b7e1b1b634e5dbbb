//! Origin connection health subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (prober.rs)
//!     → every OriginClient in the pool, concurrently
//!     → probe the cached connection, if any
//!     → failed connection discarded, next request redials
//! ```
//!
//! # Design Decisions
//! - The prober only ever removes connections, it never dials
//! - Origins without a cached connection are skipped
//! - No health state is kept; a discarded connection is the only effect

pub mod prober;

pub use prober::{Prober, SweepReport};
