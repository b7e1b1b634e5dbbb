//! HTTP/1.1 origin connector, used when the upgraded transport is turned off.
//!
//! # Responsibilities
//! - Reach origins over pooled HTTP/1.1, with or without TLS
//! - Keep the public domain in `Host` while dialing the origin host
//! - Answer liveness checks with a `HEAD` on the session's pool
//!
//! # Design Decisions
//! - Every session owns its own hyper client, so discarding a session drops
//!   the sockets it opened
//! - Sockets are dialed inside the first exchange, not in `connect`
//! - TLS server names come from the origin host, as with HTTP/2

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HOST, USER_AGENT};
use axum::http::uri::{PathAndQuery, Scheme};
use axum::http::{HeaderValue, Request, Response, Uri, Version};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;

use super::connector::{parse_probe_path, PROBE_USER_AGENT};
use super::{Connector, OriginConnection, TransportError};
use crate::routing::Route;

type OriginHttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Prepares HTTP/1.1 sessions to origins.
pub struct Http1Connector {
    https: HttpsConnector<HttpConnector>,
    scheme: Scheme,
    probe_path: PathAndQuery,
}

impl Http1Connector {
    /// `tls` must not carry ALPN protocols; `scheme` picks TLS (`https`)
    /// or plain TCP (`http`) for every origin.
    pub fn new(
        tls: ClientConfig,
        scheme: Scheme,
        connect_timeout: Duration,
        probe_path: &str,
    ) -> Result<Self, TransportError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(connect_timeout));

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        Ok(Self {
            https,
            scheme,
            probe_path: parse_probe_path(probe_path)?,
        })
    }
}

#[async_trait]
impl Connector for Http1Connector {
    async fn connect(&self, route: &Route) -> Result<Box<dyn OriginConnection>, TransportError> {
        let host = HeaderValue::from_str(route.domain())
            .map_err(|_| TransportError::InvalidTarget(route.domain().to_string()))?;
        let probe_uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(route.origin_host())
            .path_and_query(self.probe_path.clone())
            .build()
            .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;

        let client: OriginHttpClient = Client::builder(TokioExecutor::new()).build(self.https.clone());

        tracing::debug!(
            domain = %route.domain(),
            origin = %route.origin_host(),
            scheme = %self.scheme,
            "HTTP/1.1 session prepared"
        );

        Ok(Box::new(Http1Connection {
            client,
            scheme: self.scheme.clone(),
            host,
            probe_uri,
        }))
    }
}

pub struct Http1Connection {
    client: OriginHttpClient,
    scheme: Scheme,
    /// Public domain, sent as `Host` on liveness checks.
    host: HeaderValue,
    probe_uri: Uri,
}

#[async_trait]
impl OriginConnection for Http1Connection {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let request = into_http1_request(request, &self.scheme)?;
        let response = self.client.request(request).await.map_err(TransportError::Client)?;
        Ok(response.map(Body::new))
    }

    async fn ping(&self) -> Result<(), TransportError> {
        let request = Request::head(self.probe_uri.clone())
            .version(Version::HTTP_11)
            .header(HOST, self.host.clone())
            .header(USER_AGENT, PROBE_USER_AGENT)
            .body(Body::empty())
            .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;

        let response = self.client.request(request).await.map_err(TransportError::Client)?;
        tracing::trace!(status = %response.status(), uri = %self.probe_uri, "Liveness check answered");
        Ok(())
    }
}

/// Point an outbound request at the origin with this connector's scheme.
///
/// The URI authority stays the origin host (dial address) and the `Host`
/// header stays the public domain.
fn into_http1_request(mut request: Request<Body>, scheme: &Scheme) -> Result<Request<Body>, TransportError> {
    let mut parts = request.uri().clone().into_parts();
    if parts.authority.is_none() {
        return Err(TransportError::InvalidTarget(request.uri().to_string()));
    }
    parts.scheme = Some(scheme.clone());
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    *request.uri_mut() = Uri::from_parts(parts).map_err(|e| TransportError::InvalidTarget(e.to_string()))?;
    *request.version_mut() = Version::HTTP_11;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::tls;
    use tokio::net::TcpListener;

    fn connector(scheme: Scheme) -> Http1Connector {
        Http1Connector::new(tls::client_config(None).unwrap(), scheme, Duration::from_secs(1), "/").unwrap()
    }

    #[test]
    fn test_http1_request_keeps_host_and_origin() {
        let request = Request::builder()
            .uri("https://10.0.0.5:8443/path?q=1")
            .version(Version::HTTP_2)
            .header(HOST, "www.example.com")
            .body(Body::empty())
            .unwrap();

        let wire = into_http1_request(request, &Scheme::HTTP).unwrap();
        assert_eq!(wire.uri().to_string(), "http://10.0.0.5:8443/path?q=1");
        assert_eq!(wire.version(), Version::HTTP_11);
        assert_eq!(wire.headers()[HOST], "www.example.com");
    }

    #[test]
    fn test_http1_request_needs_authority() {
        let request = Request::builder().uri("/relative").body(Body::empty()).unwrap();
        assert!(matches!(
            into_http1_request(request, &Scheme::HTTPS),
            Err(TransportError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_relative_probe_path_rejected() {
        let result = Http1Connector::new(
            tls::client_config(None).unwrap(),
            Scheme::HTTP,
            Duration::from_secs(1),
            "healthz",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refused_origin_fails_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let route = Route::parse(&format!("www.example.com:{}", addr)).unwrap();
        let connection = connector(Scheme::HTTP).connect(&route).await.unwrap();

        let request = Request::get(format!("https://{}/", addr))
            .header(HOST, "www.example.com")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(connection.send(request).await, Err(TransportError::Client(_))));
        assert!(matches!(connection.ping().await, Err(TransportError::Client(_))));
    }
}
