//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (cli.rs) ──┐
//! config file (TOML)      ├→ loader.rs (parse & deserialize)
//!                         │  → cli.rs (command line overrides file)
//!                         └→ validation.rs (semantic checks)
//!                            → GatewayConfig (validated, immutable)
//!                            → RouteTable, OriginPool, listeners
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any configuration error is fatal before serving starts

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{read_config, ConfigError};
pub use schema::{
    ForwarderConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, OriginConfig, ProberConfig, TlsConfig,
};
pub use validation::{parse_bind, validate_config, ValidationError};
