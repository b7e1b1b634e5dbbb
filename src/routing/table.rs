//! Route lookup.
//!
//! # Responsibilities
//! - Parse `domain:origin` definitions
//! - Store routes keyed by public domain
//! - Look up the route for a host value
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) host lookup via HashMap
//! - Registration order preserved for logging and iteration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::uri::Authority;
use thiserror::Error;

/// Errors raised while building the route table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Definition is not of the form `domain:origin`.
    #[error("malformed route definition {0:?}, expected domain:origin")]
    Malformed(String),

    /// The same public domain was defined twice.
    #[error("domain {0} is defined more than once")]
    Duplicate(String),

    /// No route was supplied at all.
    #[error("at least one domain:origin definition is required")]
    Empty,
}

/// Static mapping from a public domain to the origin host serving it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    domain: String,
    origin_host: String,
}

impl Route {
    /// Create a route. Both parts must be non-empty URI authorities.
    pub fn new(domain: impl Into<String>, origin_host: impl Into<String>) -> Result<Self, RouteError> {
        let domain = domain.into();
        let origin_host = origin_host.into();
        let valid = |s: &str| !s.is_empty() && !s.contains('@') && s.parse::<Authority>().is_ok();
        if !valid(&domain) || !valid(&origin_host) {
            return Err(RouteError::Malformed(format!("{}:{}", domain, origin_host)));
        }
        Ok(Self { domain, origin_host })
    }

    /// Parse a `domain:origin` definition.
    ///
    /// Only the first colon separates the two halves, so the origin may
    /// carry a port (`example.com:10.0.0.5:8443`).
    pub fn parse(definition: &str) -> Result<Self, RouteError> {
        let (domain, origin) = definition
            .trim()
            .split_once(':')
            .ok_or_else(|| RouteError::Malformed(definition.to_string()))?;

        Self::new(domain, origin).map_err(|_| RouteError::Malformed(definition.to_string()))
    }

    /// Public domain callers use.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Internal host (optionally with port) the domain is served from.
    pub fn origin_host(&self) -> &str {
        &self.origin_host
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.domain, self.origin_host)
    }
}

/// Immutable domain → route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    by_domain: HashMap<String, usize>,
}

impl RouteTable {
    /// Build a table from already constructed routes.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Result<Self, RouteError> {
        let mut table = Self {
            routes: Vec::new(),
            by_domain: HashMap::new(),
        };

        for route in routes {
            if table.by_domain.contains_key(route.domain()) {
                return Err(RouteError::Duplicate(route.domain().to_string()));
            }
            table.by_domain.insert(route.domain().to_string(), table.routes.len());
            table.routes.push(Arc::new(route));
        }

        if table.routes.is_empty() {
            return Err(RouteError::Empty);
        }

        Ok(table)
    }

    /// Build a table from `domain:origin` definitions.
    pub fn from_definitions<I, S>(definitions: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let routes = definitions
            .into_iter()
            .map(|d| Route::parse(d.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(routes)
    }

    /// Exact lookup of a host value.
    pub fn resolve(&self, host: &str) -> Option<&Arc<Route>> {
        self.by_domain.get(host).map(|&i| &self.routes[i])
    }

    /// Registration index of an exact host match.
    pub fn position(&self, host: &str) -> Option<usize> {
        self.by_domain.get(host).copied()
    }

    /// Routes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
