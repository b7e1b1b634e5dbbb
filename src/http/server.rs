//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: health endpoint plus catch-all forwarding
//! - Wire up middleware (tracing, request deadline, body idle timeouts)
//! - Bind the plaintext and TLS listeners, either of which may be disabled
//! - Stop accepting and drain in-flight requests on shutdown

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::timeout::{RequestBodyTimeoutLayer, ResponseBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use super::forwarder::Forwarder;
use crate::config::{parse_bind, ConfigError, GatewayConfig, ListenerConfig};
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;
use crate::origin::OriginPool;

/// Answered by the gateway itself, for every host.
pub const HEALTHCHECK_PATH: &str = "/__healthcheck";

/// How long TLS connections may keep draining after shutdown.
const TLS_DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid {field} {value:?}")]
    Address { field: &'static str, value: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("secret is not a valid header value")]
    Secret,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("listener failed: {0}")]
    Io(#[from] io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    forwarder: Arc<Forwarder>,
    /// Scheme of the listener, for logged URLs.
    scheme: &'static str,
}

/// Both edge listeners sharing one forwarder.
pub struct EdgeServer {
    listener: ListenerConfig,
    forwarder: Arc<Forwarder>,
}

impl EdgeServer {
    pub fn new(config: &GatewayConfig, pool: Arc<OriginPool>) -> Result<Self, ServerError> {
        let secret = HeaderValue::from_str(&config.secret).map_err(|_| ServerError::Secret)?;
        let forwarder = Forwarder::new(pool, secret, config.forwarder.retry_body_limit);

        Ok(Self {
            listener: config.listener.clone(),
            forwarder: Arc::new(forwarder),
        })
    }

    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    /// Router for one listener.
    pub fn router(&self, scheme: &'static str) -> Router {
        build_router(Arc::clone(&self.forwarder), &self.listener, scheme)
    }

    /// Serve until shutdown. A failure of either listener is fatal.
    pub async fn run(self, shutdown: &Shutdown) -> Result<(), ServerError> {
        let plain_addr = bind_address("listener.bind_address", &self.listener.bind_address)?;
        let tls_addr = bind_address("listener.tls_bind_address", &self.listener.tls_bind_address)?;

        let plaintext = match plain_addr {
            Some(addr) => Some(
                TcpListener::bind(addr)
                    .await
                    .map_err(|source| ServerError::Bind { addr, source })?,
            ),
            None => None,
        };
        let tls = match tls_addr {
            Some(addr) => Some((addr, load_tls_config(&self.listener.tls).await?)),
            None => None,
        };

        let plain_task = async {
            match plaintext {
                Some(listener) => serve_plaintext(listener, self.router("http"), shutdown.signalled()).await,
                None => Ok(()),
            }
        };
        let tls_task = async {
            match tls {
                Some((addr, config)) => serve_tls(addr, config, self.router("https"), shutdown.signalled()).await,
                None => Ok(()),
            }
        };

        tokio::try_join!(plain_task, tls_task)?;
        tracing::info!("Edge listeners stopped");
        Ok(())
    }
}

fn bind_address(field: &'static str, value: &str) -> Result<Option<SocketAddr>, ServerError> {
    parse_bind(value).map_err(|_| ServerError::Address {
        field,
        value: value.to_string(),
    })
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(forwarder: Arc<Forwarder>, listener: &ListenerConfig, scheme: &'static str) -> Router {
    Router::new()
        .route(HEALTHCHECK_PATH, any(healthcheck))
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(AppState { forwarder, scheme })
        .layer(RequestBodyTimeoutLayer::new(listener.read_timeout()))
        .layer(ResponseBodyTimeoutLayer::new(listener.write_timeout()))
        .layer(TimeoutLayer::new(listener.request_timeout()))
        .layer(TraceLayer::new_for_http())
}

/// Serve plaintext HTTP/1.1 and h2c on an already bound listener.
pub async fn serve_plaintext(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Plaintext listener starting");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
}

/// Serve HTTPS with ALPN h2 and http/1.1.
pub async fn serve_tls(
    addr: SocketAddr,
    config: RustlsConfig,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let handle = Handle::new();
    let stopper = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        stopper.graceful_shutdown(Some(TLS_DRAIN_GRACE));
    });

    tracing::info!(address = %addr, "TLS listener starting");
    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await
}

async fn healthcheck() -> &'static str {
    "ok"
}

async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.forwarder.forward(remote, state.scheme, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    fn server() -> EdgeServer {
        let config = GatewayConfig {
            routes: vec!["www.example.com:127.0.0.1:1".into()],
            ..GatewayConfig::default()
        };
        let pool = Arc::new(OriginPool::from_config(&config).unwrap());
        EdgeServer::new(&config, pool).unwrap()
    }

    fn app() -> Router {
        server()
            .router("http")
            .layer(MockConnectInfo(SocketAddr::from(([192, 0, 2, 7], 40000))))
    }

    #[tokio::test]
    async fn test_healthcheck_any_method_any_host() {
        for method in [Method::GET, Method::POST, Method::HEAD] {
            let request = Request::builder()
                .method(method.clone())
                .uri(HEALTHCHECK_PATH)
                .header("host", "unknown.example.org")
                .body(Body::empty())
                .unwrap();

            let response = app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", method);
            if method != Method::HEAD {
                let body = axum::body::to_bytes(response.into_body(), 16).await.unwrap();
                assert_eq!(&body[..], b"ok");
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_domain_is_bad_request() {
        let request = Request::builder()
            .uri("/anything")
            .header("host", "nope.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"Bad Request\n");
    }

    #[tokio::test]
    async fn test_missing_host_is_bad_request() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_disabled_listeners_skip_binding() {
        let mut config = GatewayConfig {
            routes: vec!["a.com:127.0.0.1:1".into()],
            ..GatewayConfig::default()
        };
        config.listener.bind_address = String::new();
        config.listener.tls_bind_address = String::new();

        let pool = Arc::new(OriginPool::from_config(&config).unwrap());
        let server = EdgeServer::new(&config, pool).unwrap();
        server.run(&Shutdown::new()).await.unwrap();
    }
}
