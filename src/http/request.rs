//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract routing-relevant information (host, URL, transport kind, client IP)
//! - Rewrite the inbound request into the outbound request for an origin
//! - Inject caller identity and the shared secret
//! - Keep the body replayable when it is small enough to retry
//!
//! # Design Decisions
//! - Absolute-target authority wins over the Host header
//! - The outbound request is rebuilt per attempt; inbound extensions never leak upstream
//! - Connection-specific headers are dropped, they cannot travel over HTTP/2

use std::net::{IpAddr, SocketAddr};

use axum::body::{Body, Bytes};
use axum::http::header::{HOST, TE};
use axum::http::{request, HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, Version};
use bytes::BytesMut;
use futures_util::StreamExt;

use crate::routing::Route;

/// Client address as seen by the gateway.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Caller identity for origins.
pub const X_EDGE_CONNECTING_IP: HeaderName = HeaderName::from_static("x-edge-connecting-ip");

/// Shared secret proving the request came through the gateway.
pub const X_EDGE_SECRET: HeaderName = HeaderName::from_static("x-edge-secret");

const CONNECTION_SPECIFIC: [&str; 5] = ["connection", "keep-alive", "proxy-connection", "transfer-encoding", "upgrade"];

/// Host the caller addressed.
pub fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .uri()
        .authority()
        .map(|a| a.as_str())
        .or_else(|| request.headers().get(HOST).and_then(|h| h.to_str().ok()))
}

/// URL for logs: the absolute target when present, rebuilt otherwise.
pub fn request_url<B>(request: &Request<B>, scheme: &str) -> String {
    let uri = request.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return uri.to_string();
    }
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{}://{}{}", scheme, request_host(request).unwrap_or_default(), path)
}

/// Short marker of the caller's protocol.
pub fn transport_marker(version: Version) -> &'static str {
    match version {
        Version::HTTP_2 => "h2",
        Version::HTTP_3 => "h3",
        _ => "h1",
    }
}

/// Peer address without the port.
pub fn client_ip(remote: SocketAddr) -> IpAddr {
    remote.ip().to_canonical()
}

/// Template of the request sent to an origin, reusable across attempts.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl OutboundRequest {
    /// Rewrite inbound request parts for `route`.
    ///
    /// Target becomes `https://{origin}{path_and_query}`, `Host` becomes the
    /// public domain.
    pub fn new(parts: &request::Parts, route: &Route, remote_ip: IpAddr, secret: &HeaderValue) -> Result<Self, String> {
        let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
        let uri: Uri = format!("https://{}{}", route.origin_host(), path)
            .parse()
            .map_err(|e| format!("invalid origin target: {}", e))?;

        let mut headers = parts.headers.clone();
        strip_connection_headers(&mut headers);

        let host = HeaderValue::from_str(route.domain()).map_err(|e| format!("invalid domain header: {}", e))?;
        let ip = HeaderValue::from_str(&remote_ip.to_string()).map_err(|e| format!("invalid client ip: {}", e))?;

        headers.insert(HOST, host);
        headers.insert(X_FORWARDED_FOR, ip.clone());
        headers.insert(X_EDGE_CONNECTING_IP, ip);
        headers.insert(X_EDGE_SECRET, secret.clone());

        Ok(Self {
            method: parts.method.clone(),
            uri,
            headers,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Materialize one attempt.
    pub fn build(&self, body: Body) -> Request<Body> {
        let mut request = Request::new(body);
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

fn strip_connection_headers(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too.
    let listed: Vec<HeaderName> = headers
        .get_all("connection")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in CONNECTION_SPECIFIC {
        headers.remove(name);
    }

    let trailers_only = headers
        .get(TE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("trailers"));
    if !trailers_only {
        headers.remove(TE);
    }
}

/// Request body that can be sent again when it was small enough to buffer.
#[derive(Debug)]
pub enum ReplayableBody {
    Buffered(Bytes),
    Streaming(Option<Body>),
}

impl ReplayableBody {
    /// Read up to `limit` bytes of `body`.
    ///
    /// A body that ends within the limit is kept for replay. Anything longer
    /// is streamed once, the bytes already read first.
    pub async fn from_body(body: Body, limit: usize) -> Result<Self, axum::Error> {
        let mut stream = body.into_data_stream();
        let mut buffered = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            buffered.extend_from_slice(&chunk?);
            if buffered.len() > limit {
                let prefix = futures_util::stream::once(async move { Ok::<_, axum::Error>(buffered.freeze()) });
                return Ok(Self::Streaming(Some(Body::from_stream(prefix.chain(stream)))));
            }
        }

        Ok(Self::Buffered(buffered.freeze()))
    }

    /// Attempts this body can support, capped at `max`.
    pub fn attempts(&self, max: u32) -> u32 {
        match self {
            Self::Buffered(_) => max,
            Self::Streaming(_) => 1,
        }
    }

    /// Body for the next attempt, `None` once a streamed body is spent.
    pub fn take(&mut self) -> Option<Body> {
        match self {
            Self::Buffered(bytes) => Some(Body::from(bytes.clone())),
            Self::Streaming(body) => body.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn parts(uri: &str, headers: &[(&str, &str)]) -> request::Parts {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn route() -> Route {
        Route::new("www.example.com", "10.0.0.5").unwrap()
    }

    #[test]
    fn test_outbound_rewrites_target_and_host() {
        let parts = parts("/a/b?c=d", &[("host", "www.example.com"), ("accept", "*/*")]);
        let secret = HeaderValue::from_static("s3cret");
        let outbound = OutboundRequest::new(&parts, &route(), "192.0.2.7".parse().unwrap(), &secret).unwrap();

        assert_eq!(outbound.uri().to_string(), "https://10.0.0.5/a/b?c=d");
        let headers = outbound.headers();
        assert_eq!(headers["host"], "www.example.com");
        assert_eq!(headers["x-forwarded-for"], "192.0.2.7");
        assert_eq!(headers["x-edge-connecting-ip"], "192.0.2.7");
        assert_eq!(headers["x-edge-secret"], "s3cret");
        assert_eq!(headers["accept"], "*/*");

        let request = outbound.build(Body::empty());
        assert_eq!(request.method(), Method::POST);
    }

    #[test]
    fn test_outbound_replaces_spoofed_identity() {
        let parts = parts(
            "/",
            &[("x-edge-secret", "forged"), ("x-edge-connecting-ip", "1.2.3.4"), ("x-forwarded-for", "1.2.3.4")],
        );
        let secret = HeaderValue::from_static("real");
        let outbound = OutboundRequest::new(&parts, &route(), "192.0.2.7".parse().unwrap(), &secret).unwrap();

        assert_eq!(outbound.headers().get_all("x-edge-secret").iter().count(), 1);
        assert_eq!(outbound.headers()["x-edge-secret"], "real");
        assert_eq!(outbound.headers()["x-forwarded-for"], "192.0.2.7");
    }

    #[test]
    fn test_connection_headers_stripped() {
        let parts = parts(
            "/",
            &[
                ("connection", "keep-alive, x-hop"),
                ("keep-alive", "timeout=5"),
                ("x-hop", "1"),
                ("transfer-encoding", "chunked"),
                ("te", "gzip"),
                ("x-keep", "1"),
            ],
        );
        let outbound =
            OutboundRequest::new(&parts, &route(), "192.0.2.7".parse().unwrap(), &HeaderValue::from_static("s")).unwrap();
        let headers = outbound.headers();

        for gone in ["connection", "keep-alive", "x-hop", "transfer-encoding", "te"] {
            assert!(headers.get(gone).is_none(), "{} should be stripped", gone);
        }
        assert_eq!(headers["x-keep"], "1");
    }

    #[test]
    fn test_te_trailers_preserved() {
        let parts = parts("/", &[("te", "trailers")]);
        let outbound =
            OutboundRequest::new(&parts, &route(), "192.0.2.7".parse().unwrap(), &HeaderValue::from_static("s")).unwrap();
        assert_eq!(outbound.headers()["te"], "trailers");
    }

    #[test]
    fn test_request_host_prefers_absolute_target() {
        let request = Request::builder()
            .uri("https://www.example.com/x")
            .header("host", "other.example.com")
            .body(())
            .unwrap();
        assert_eq!(request_host(&request), Some("www.example.com"));
        assert_eq!(request_url(&request, "http"), "https://www.example.com/x");

        let request = Request::builder().uri("/x?y=1").header("host", "a.com").body(()).unwrap();
        assert_eq!(request_host(&request), Some("a.com"));
        assert_eq!(request_url(&request, "http"), "http://a.com/x?y=1");
    }

    #[test]
    fn test_client_ip_drops_port() {
        assert_eq!(client_ip("192.0.2.7:54321".parse().unwrap()).to_string(), "192.0.2.7");
        assert_eq!(client_ip("[2001:db8::1]:443".parse().unwrap()).to_string(), "2001:db8::1");
        let mapped = SocketAddr::new(Ipv6Addr::from([0, 0, 0, 0, 0, 0xffff, 0xc000, 0x0207]).into(), 80);
        assert_eq!(client_ip(mapped).to_string(), "192.0.2.7");
    }

    #[tokio::test]
    async fn test_small_body_is_replayable() {
        let mut body = ReplayableBody::from_body(Body::from("hello"), 1024).await.unwrap();
        assert_eq!(body.attempts(2), 2);

        for _ in 0..2 {
            let bytes = axum::body::to_bytes(body.take().unwrap(), 1024).await.unwrap();
            assert_eq!(&bytes[..], b"hello");
        }
    }

    #[tokio::test]
    async fn test_large_body_streams_once() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"0123456789")), Ok(Bytes::from_static(b"abcdefghij"))];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let mut body = ReplayableBody::from_body(body, 12).await.unwrap();
        assert_eq!(body.attempts(2), 1);

        let streamed = axum::body::to_bytes(body.take().unwrap(), 1024).await.unwrap();
        assert_eq!(&streamed[..], b"0123456789abcdefghij");
        assert!(body.take().is_none());
    }

    #[tokio::test]
    async fn test_empty_body_is_replayable() {
        let body = ReplayableBody::from_body(Body::empty(), 0).await.unwrap();
        assert_eq!(body.attempts(2), 2);
    }
}
