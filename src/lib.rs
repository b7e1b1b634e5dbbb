//! Domain-routing edge gateway.
//!
//! Accepts HTTP/1.1 and HTTP/2 from the public internet, maps the requested
//! host to a statically configured origin, and forwards over one cached,
//! multiplexed HTTP/2 connection per origin.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod origin;
pub mod routing;

pub use config::GatewayConfig;
pub use health::Prober;
pub use http::EdgeServer;
pub use lifecycle::Shutdown;
pub use origin::OriginPool;
