//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     "domain:origin" definitions
//!     → table.rs (parse, reject malformed and duplicate domains)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (host or absolute-target authority)
//!     → RouteTable::resolve (exact match)
//!     → Return: matched Route or None
//! ```
//!
//! # Design Decisions
//! - Routes built at startup, immutable at runtime
//! - Exact host match only, no wildcard or suffix matching
//! - Each public domain maps to exactly one origin host
//! - An empty table is a configuration error

pub mod table;

pub use table::{Route, RouteError, RouteTable};
