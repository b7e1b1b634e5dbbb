//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use tokio::net::TcpListener;

use edge_gateway::config::ListenerConfig;
use edge_gateway::http::{build_router, Forwarder};
use edge_gateway::origin::client::ClientTimeouts;
use edge_gateway::origin::{Connector, OriginConnection, OriginPool, TransportError};
use edge_gateway::routing::{Route, RouteTable};

pub const SECRET: &str = "test-secret";
pub const CALLER: ([u8; 4], u16) = ([192, 0, 2, 7], 40000);

/// What the scripted origin does for one attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    },
    SendError,
    ConnectError,
}

impl Outcome {
    pub fn status(status: u16) -> Self {
        Outcome::Respond {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: &str) -> Self {
        Outcome::Respond {
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }
}

/// Request as the origin received it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// In-memory origin driven by a script; answers 200 once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<Outcome>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
    dials: Arc<AtomicUsize>,
    sends: Arc<AtomicUsize>,
    pings_fail: Arc<AtomicBool>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        let connector = Self::default();
        connector.script.lock().unwrap().extend(script);
        connector
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Make liveness checks on every connection fail (or succeed again).
    pub fn fail_pings(&self, fail: bool) {
        self.pings_fail.store(fail, Ordering::SeqCst);
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn next(&self) -> Option<Outcome> {
        self.script.lock().unwrap().pop_front()
    }

    fn connect_fails(&self) -> bool {
        let mut script = self.script.lock().unwrap();
        if matches!(script.front(), Some(Outcome::ConnectError)) {
            script.pop_front();
            return true;
        }
        false
    }
}

struct ScriptedConnection {
    connector: ScriptedConnector,
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, route: &Route) -> Result<Box<dyn OriginConnection>, TransportError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.connect_fails() {
            return Err(TransportError::Connect {
                addr: route.origin_host().to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(Box::new(ScriptedConnection {
            connector: self.clone(),
        }))
    }
}

#[async_trait]
impl OriginConnection for ScriptedConnection {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        self.connector.sends.fetch_add(1, Ordering::SeqCst);

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.map_err(|_| TransportError::Closed)?;
        self.connector.seen.lock().unwrap().push(Seen {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        });

        match self.connector.next().unwrap_or_else(|| Outcome::ok("ok")) {
            Outcome::Respond { status, headers, body } => {
                let mut response = Response::builder().status(StatusCode::from_u16(status).unwrap());
                for (name, value) in headers {
                    response = response.header(name, value);
                }
                Ok(response.body(Body::from(body)).unwrap())
            }
            Outcome::SendError | Outcome::ConnectError => Err(TransportError::Closed),
        }
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.connector.pings_fail.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

pub fn pool(connector: &ScriptedConnector, routes: &[&str]) -> Arc<OriginPool> {
    let routes = RouteTable::from_definitions(routes).unwrap();
    Arc::new(OriginPool::new(routes, Arc::new(connector.clone()), ClientTimeouts::default()))
}

pub fn forwarder(pool: Arc<OriginPool>) -> Arc<Forwarder> {
    Arc::new(Forwarder::new(pool, HeaderValue::from_static(SECRET), 1024 * 1024))
}

/// Gateway router with a fixed caller address, for `oneshot` tests.
pub fn app(pool: Arc<OriginPool>) -> Router {
    build_router(forwarder(pool), &ListenerConfig::default(), "http")
        .layer(MockConnectInfo(SocketAddr::from(CALLER)))
}

pub fn get(host: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("host", host)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

/// Origin speaking h2c on a random local port, recording the HTTP version it saw.
pub async fn start_h2c_origin(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Origin handler echoing what it saw back in response headers, with the
/// path as the body.
pub async fn echo(request: Request<Body>) -> impl IntoResponse {
    let header = |headers: &HeaderMap, name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    let headers = request.headers();
    (
        [
            ("x-seen-version", version_name(request.version()).to_string()),
            ("x-seen-authority", request.uri().authority().map(|a| a.to_string()).unwrap_or_default()),
            ("x-seen-host", header(headers, "host")),
            ("x-seen-secret", header(headers, "x-edge-secret")),
            ("x-seen-ip", header(headers, "x-edge-connecting-ip")),
            ("x-seen-forwarded-for", header(headers, "x-forwarded-for")),
        ],
        request.uri().path_and_query().map(|pq| pq.to_string()).unwrap_or_default(),
    )
}

/// Echo origin with a `/moved` redirect.
pub fn origin_router() -> Router {
    Router::new()
        .route("/moved", any(|| async { (StatusCode::FOUND, [(LOCATION, "/elsewhere")]) }))
        .route("/", any(echo))
        .route("/{*path}", any(echo))
}

/// Version string an origin handler can echo back.
pub fn version_name(version: Version) -> &'static str {
    match version {
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_11 => "HTTP/1.1",
        _ => "other",
    }
}
