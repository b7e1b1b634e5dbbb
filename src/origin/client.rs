//! Per-origin client with a lazily established, invalidating connection.
//!
//! # Responsibilities
//! - Cache one connection per origin, dial it on first use
//! - Run one request attempt under the response timeout
//! - Discard the cached connection on any transport failure
//! - Probe the cached connection for liveness
//!
//! # Design Decisions
//! - Readers load the cached connection lock-free (`ArcSwapOption`)
//! - Dialing is serialized per origin, never across origins
//! - Invalidation is compare-and-swap: only the connection that failed is
//!   dropped, a newer one installed by another task survives
//! - Tasks that already hold the old connection finish with it

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{Connector, OriginConnection, TransportError};
use crate::routing::Route;

/// Connection IDs only need to be unique, relaxed ordering is enough.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Timeouts applied by an [`OriginClient`].
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// Deadline for response headers of one attempt.
    pub response: Duration,
    /// Deadline for one liveness exchange.
    pub probe: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_secs(5),
            probe: Duration::from_secs(5),
        }
    }
}

/// Result of probing one origin.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The cached connection answered.
    Healthy,
    /// The cached connection failed and was discarded.
    Unhealthy(TransportError),
    /// Nothing cached, nothing to probe.
    Skipped,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Healthy => "healthy",
            ProbeOutcome::Unhealthy(_) => "unhealthy",
            ProbeOutcome::Skipped => "skipped",
        }
    }
}

struct CachedConnection {
    id: u64,
    inner: Box<dyn OriginConnection>,
}

/// Transport session owner for one route.
pub struct OriginClient {
    route: Arc<Route>,
    connector: Arc<dyn Connector>,
    connection: ArcSwapOption<CachedConnection>,
    dial_gate: Mutex<()>,
    timeouts: ClientTimeouts,
}

impl OriginClient {
    pub fn new(route: Arc<Route>, connector: Arc<dyn Connector>, timeouts: ClientTimeouts) -> Self {
        Self {
            route,
            connector,
            connection: ArcSwapOption::empty(),
            dial_gate: Mutex::new(()),
            timeouts,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether a connection is currently cached.
    pub fn is_connected(&self) -> bool {
        self.connection.load().is_some()
    }

    /// Perform exactly one request attempt.
    ///
    /// Any transport failure, including the response timeout, discards the
    /// connection used so the next attempt starts fresh.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let connection = self.connection().await?;

        let result = match timeout(self.timeouts.response, connection.inner.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeouts.response)),
        };

        if let Err(e) = &result {
            self.discard(&connection, e);
        }
        result
    }

    /// Check the cached connection, discarding it if it does not answer.
    pub async fn probe(&self) -> ProbeOutcome {
        let Some(connection) = self.connection.load_full() else {
            return ProbeOutcome::Skipped;
        };

        let result = if connection.inner.is_closed() {
            Err(TransportError::Closed)
        } else {
            match timeout(self.timeouts.probe, connection.inner.ping()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.timeouts.probe)),
            }
        };

        match result {
            Ok(()) => ProbeOutcome::Healthy,
            Err(e) => {
                self.discard(&connection, &e);
                ProbeOutcome::Unhealthy(e)
            }
        }
    }

    /// Drop whatever connection is cached. A no-op when nothing is cached.
    pub fn invalidate(&self) {
        if let Some(previous) = self.connection.swap(None) {
            tracing::debug!(domain = %self.route.domain(), connection_id = previous.id, "Origin connection invalidated");
        }
    }

    async fn connection(&self) -> Result<Arc<CachedConnection>, TransportError> {
        if let Some(connection) = self.usable() {
            return Ok(connection);
        }

        let _gate = self.dial_gate.lock().await;

        // Another task may have dialed while we waited.
        if let Some(connection) = self.usable() {
            return Ok(connection);
        }

        let inner = self.connector.connect(&self.route).await?;
        let connection = Arc::new(CachedConnection {
            id: CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            inner,
        });
        self.connection.store(Some(Arc::clone(&connection)));

        tracing::info!(
            domain = %self.route.domain(),
            origin = %self.route.origin_host(),
            connection_id = connection.id,
            "Origin connection established"
        );
        Ok(connection)
    }

    fn usable(&self) -> Option<Arc<CachedConnection>> {
        let connection = self.connection.load_full()?;
        if connection.inner.is_closed() {
            self.discard(&connection, &TransportError::Closed);
            return None;
        }
        Some(connection)
    }

    fn discard(&self, connection: &Arc<CachedConnection>, cause: &TransportError) {
        let current = Some(Arc::clone(connection));
        let previous = self.connection.compare_and_swap(&current, None::<Arc<CachedConnection>>);

        if matches!(&*previous, Some(p) if Arc::ptr_eq(p, connection)) {
            tracing::debug!(
                domain = %self.route.domain(),
                connection_id = connection.id,
                error = %cause,
                "Discarded origin connection"
            );
        }
    }
}

impl std::fmt::Debug for OriginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginClient")
            .field("route", &self.route)
            .field("connected", &self.is_connected())
            .finish()
    }
}
