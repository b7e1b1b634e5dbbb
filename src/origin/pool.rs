//! Registry of origin clients, one per route.

use std::path::Path;
use std::sync::Arc;

use axum::http::uri::Scheme;

use super::client::{ClientTimeouts, OriginClient};
use super::connector::H2Connector;
use super::http1::Http1Connector;
use super::{tls, Connector};
use crate::config::{ConfigError, GatewayConfig, ValidationError};
use crate::routing::RouteTable;

/// Owns the route table and the client serving each of its routes.
///
/// Built once at startup and shared by the forwarder and the prober.
#[derive(Debug)]
pub struct OriginPool {
    routes: RouteTable,
    clients: Vec<Arc<OriginClient>>,
}

impl OriginPool {
    pub fn new(routes: RouteTable, connector: Arc<dyn Connector>, timeouts: ClientTimeouts) -> Self {
        let clients = routes
            .iter()
            .map(|route| Arc::new(OriginClient::new(Arc::clone(route), Arc::clone(&connector), timeouts)))
            .collect();

        Self { routes, clients }
    }

    /// Build the route table and the connector described by `config`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let routes = RouteTable::from_definitions(&config.routes)
            .map_err(|e| ConfigError::Validation(vec![ValidationError::Route(e)]))?;

        let timeouts = ClientTimeouts {
            response: config.origin.response_header_timeout(),
            probe: config.prober.timeout(),
        };
        Ok(Self::new(routes, origin_connector(config)?, timeouts))
    }

    /// Client for an exact host match.
    pub fn resolve(&self, host: &str) -> Option<&Arc<OriginClient>> {
        self.routes.position(host).map(|i| &self.clients[i])
    }

    /// Clients in route registration order.
    pub fn clients(&self) -> impl Iterator<Item = &Arc<OriginClient>> {
        self.clients.iter()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

fn origin_connector(config: &GatewayConfig) -> Result<Arc<dyn Connector>, ConfigError> {
    let origin = &config.origin;
    let probe_path = &config.prober.path;
    let bad_probe_path = |_| ConfigError::Validation(vec![ValidationError::ProbePath(probe_path.clone())]);
    let ca_path = if origin.plaintext {
        None
    } else {
        origin.ca_path.as_deref().map(Path::new)
    };

    if !origin.upgrade {
        let scheme = if origin.plaintext { Scheme::HTTP } else { Scheme::HTTPS };
        tracing::info!(scheme = %scheme, "Origins reached over HTTP/1.1");
        let connector = Http1Connector::new(tls::client_config(ca_path)?, scheme, origin.connect_timeout(), probe_path)
            .map_err(bad_probe_path)?;
        return Ok(Arc::new(connector));
    }

    let connector = if origin.plaintext {
        H2Connector::plaintext(origin.connect_timeout(), probe_path)
    } else {
        H2Connector::tls(tls::connector(ca_path)?, origin.connect_timeout(), probe_path)
    }
    .map_err(bad_probe_path)?;
    Ok(Arc::new(connector))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(routes: &[&str]) -> GatewayConfig {
        GatewayConfig {
            routes: routes.iter().map(|r| r.to_string()).collect(),
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_one_client_per_route() {
        let pool = OriginPool::from_config(&config(&["a.com:10.0.0.1", "b.com:10.0.0.2:8443"])).unwrap();

        assert_eq!(pool.clients().count(), 2);
        assert_eq!(pool.resolve("b.com").unwrap().route().origin_host(), "10.0.0.2:8443");
        assert!(pool.resolve("c.com").is_none());
        assert!(!pool.resolve("a.com").unwrap().is_connected());
    }

    #[test]
    fn test_same_client_for_every_lookup() {
        let pool = OriginPool::from_config(&config(&["a.com:10.0.0.1"])).unwrap();
        assert!(Arc::ptr_eq(pool.resolve("a.com").unwrap(), pool.resolve("a.com").unwrap()));
    }

    #[test]
    fn test_http1_mode_builds_clients() {
        let mut config = config(&["a.com:10.0.0.1"]);
        config.origin.upgrade = false;

        let pool = OriginPool::from_config(&config).unwrap();
        assert_eq!(pool.clients().count(), 1);

        config.origin.plaintext = true;
        assert!(OriginPool::from_config(&config).is_ok());
    }

    #[test]
    fn test_bad_probe_path_rejected_in_both_modes() {
        let mut config = config(&["a.com:10.0.0.1"]);
        config.prober.path = "healthz".to_string();
        assert!(matches!(OriginPool::from_config(&config), Err(ConfigError::Validation(_))));

        config.origin.upgrade = false;
        assert!(matches!(OriginPool::from_config(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_routes_rejected() {
        assert!(matches!(OriginPool::from_config(&config(&[])), Err(ConfigError::Validation(_))));
    }
}
