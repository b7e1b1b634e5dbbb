//! HTTP/2 origin connector.
//!
//! # Responsibilities
//! - Resolve the origin host to a dial address (default port per scheme)
//! - TCP connect, TLS with ALPN `h2` (or h2c prior knowledge), HTTP/2 handshake
//! - Drive the connection in a background task
//! - Put requests on the wire with `:authority` taken from the `Host` header

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HOST, USER_AGENT};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri, Version};
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use super::tls::ALPN_H2;
use super::{Connector, OriginConnection, TransportError};
use crate::routing::Route;

pub(super) const PROBE_USER_AGENT: &str = "edge-gateway-probe";

/// Dials origins over HTTP/2.
pub struct H2Connector {
    /// `None` speaks h2c with prior knowledge.
    tls: Option<TlsConnector>,
    connect_timeout: Duration,
    probe_path: PathAndQuery,
}

impl H2Connector {
    /// Connector for TLS origins (`https://`).
    pub fn tls(tls: TlsConnector, connect_timeout: Duration, probe_path: &str) -> Result<Self, TransportError> {
        Ok(Self {
            tls: Some(tls),
            connect_timeout,
            probe_path: parse_probe_path(probe_path)?,
        })
    }

    /// Connector for plaintext HTTP/2 origins.
    pub fn plaintext(connect_timeout: Duration, probe_path: &str) -> Result<Self, TransportError> {
        Ok(Self {
            tls: None,
            connect_timeout,
            probe_path: parse_probe_path(probe_path)?,
        })
    }

    fn scheme(&self) -> Scheme {
        if self.tls.is_some() {
            Scheme::HTTPS
        } else {
            Scheme::HTTP
        }
    }

    async fn dial(&self, target: &OriginTarget) -> Result<http2::SendRequest<Body>, TransportError> {
        let addr = target.addr();
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|source| TransportError::Connect { addr, source })?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(addr = %target.addr(), error = %e, "Failed to set TCP_NODELAY");
        }

        let Some(tls) = &self.tls else {
            return handshake(tcp).await;
        };

        let host = target.server_name().to_string();
        let name = ServerName::try_from(host.clone()).map_err(|e| TransportError::Tls {
            host: host.clone(),
            reason: e.to_string(),
        })?;
        let stream = tls.connect(name, tcp).await.map_err(|e| TransportError::Tls {
            host: host.clone(),
            reason: e.to_string(),
        })?;

        if stream.get_ref().1.alpn_protocol() != Some(ALPN_H2) {
            return Err(TransportError::Tls {
                host,
                reason: "origin did not negotiate h2".to_string(),
            });
        }

        handshake(stream).await
    }
}

#[async_trait]
impl Connector for H2Connector {
    async fn connect(&self, route: &Route) -> Result<Box<dyn OriginConnection>, TransportError> {
        let scheme = self.scheme();
        let default_port = if scheme == Scheme::HTTPS { 443 } else { 80 };
        let target = OriginTarget::parse(route.origin_host(), default_port)?;

        let sender = timeout(self.connect_timeout, self.dial(&target))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        let probe_uri = Uri::builder()
            .scheme(scheme.clone())
            .authority(route.domain())
            .path_and_query(self.probe_path.clone())
            .build()
            .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;

        tracing::debug!(
            domain = %route.domain(),
            addr = %target.addr(),
            scheme = %scheme,
            "HTTP/2 session established"
        );

        Ok(Box::new(H2Connection {
            sender,
            scheme,
            probe_uri,
        }))
    }
}

/// One HTTP/2 session. Cloned senders multiplex over the same connection.
pub struct H2Connection {
    sender: http2::SendRequest<Body>,
    scheme: Scheme,
    probe_uri: Uri,
}

#[async_trait]
impl OriginConnection for H2Connection {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let request = into_wire_request(request, &self.scheme)?;

        let mut sender = self.sender.clone();
        sender.ready().await.map_err(TransportError::Request)?;
        let response = sender.send_request(request).await.map_err(TransportError::Request)?;

        Ok(response.map(Body::new))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::Closed);
        }

        let request = Request::head(self.probe_uri.clone())
            .version(Version::HTTP_2)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .body(Body::empty())
            .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;

        let mut sender = self.sender.clone();
        sender.ready().await.map_err(TransportError::Request)?;
        let response = sender.send_request(request).await.map_err(TransportError::Request)?;

        tracing::trace!(status = %response.status(), uri = %self.probe_uri, "Probe answered");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

async fn handshake<T>(io: T) -> Result<http2::SendRequest<Body>, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(io))
        .await
        .map_err(TransportError::Handshake)?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "Origin connection ended with error");
        }
    });

    Ok(sender)
}

/// Rewrite an outbound request for the HTTP/2 wire.
///
/// The `Host` header becomes `:authority` so the origin sees the public
/// domain; the dial address was already taken from the origin host.
fn into_wire_request(mut request: Request<Body>, scheme: &Scheme) -> Result<Request<Body>, TransportError> {
    let authority = match request.headers_mut().remove(HOST) {
        Some(host) => Authority::try_from(host.as_bytes())
            .map_err(|_| TransportError::InvalidTarget(format!("host header {:?}", host)))?,
        None => request
            .uri()
            .authority()
            .cloned()
            .ok_or_else(|| TransportError::InvalidTarget(request.uri().to_string()))?,
    };

    let mut parts = request.uri().clone().into_parts();
    parts.scheme = Some(scheme.clone());
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    *request.uri_mut() = Uri::from_parts(parts).map_err(|e| TransportError::InvalidTarget(e.to_string()))?;
    *request.version_mut() = Version::HTTP_2;
    Ok(request)
}

pub(super) fn parse_probe_path(path: &str) -> Result<PathAndQuery, TransportError> {
    if !path.starts_with('/') {
        return Err(TransportError::InvalidTarget(format!("probe path {:?} must start with /", path)));
    }
    PathAndQuery::from_str(path).map_err(|e| TransportError::InvalidTarget(e.to_string()))
}

/// Dialable form of an origin host.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OriginTarget {
    /// Host as written, IPv6 literals keep their brackets.
    host: String,
    port: u16,
}

impl OriginTarget {
    fn parse(origin_host: &str, default_port: u16) -> Result<Self, TransportError> {
        let authority = Authority::from_str(origin_host)
            .map_err(|_| TransportError::InvalidTarget(origin_host.to_string()))?;

        Ok(Self {
            host: authority.host().to_string(),
            port: authority.port_u16().unwrap_or(default_port),
        })
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}
