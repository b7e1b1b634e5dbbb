//! Per-request forwarding to the origin.
//!
//! # Responsibilities
//! - Resolve the caller's host to an origin client
//! - Send the rewritten request with a bounded number of attempts
//! - Pass redirects through untouched
//! - Answer 400 for unknown domains or unreadable request bodies, and 502
//!   when the origin stays unreachable
//! - Emit the request log line and request metrics
//!
//! # Design Decisions
//! - At most [`MAX_ATTEMPTS`] attempts, immediately one after another
//! - Any origin response ends the loop; only transport failures are retried
//! - Bodies larger than the replay limit are streamed once and never retried

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::request::{client_ip, request_host, request_url, transport_marker, OutboundRequest, ReplayableBody};
use super::response::{accepts_gzip, relay};
use crate::observability::{logging, metrics};
use crate::origin::{OriginClient, OriginPool};

/// Attempts per request when the body can be replayed.
pub const MAX_ATTEMPTS: u32 = 2;

/// Why a request produced no origin response.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Host did not match any route.
    #[error("Invalid domain")]
    InvalidDomain,

    /// The caller's request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// Every attempt failed at the transport level.
    #[error("origin for {domain} unreachable: {cause}")]
    OriginUnreachable { domain: String, cause: String },
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidDomain | Self::RequestBody(_) => StatusCode::BAD_REQUEST,
            Self::OriginUnreachable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn body(&self) -> &'static str {
        match self {
            Self::InvalidDomain | Self::RequestBody(_) => "Bad Request\n",
            Self::OriginUnreachable { .. } => "Could not reach origin\n",
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))],
            self.body(),
        )
            .into_response()
    }
}

/// Forwards caller requests to the origin serving their domain.
#[derive(Debug)]
pub struct Forwarder {
    pool: Arc<OriginPool>,
    secret: HeaderValue,
    retry_body_limit: usize,
}

impl Forwarder {
    pub fn new(pool: Arc<OriginPool>, secret: HeaderValue, retry_body_limit: usize) -> Self {
        Self {
            pool,
            secret,
            retry_body_limit,
        }
    }

    pub fn pool(&self) -> &Arc<OriginPool> {
        &self.pool
    }

    /// Handle one caller request end to end.
    ///
    /// `scheme` names the listener the request arrived on and is only used
    /// to rebuild the logged URL.
    pub async fn forward(&self, remote: SocketAddr, scheme: &str, request: Request<Body>) -> Response {
        let start = Instant::now();
        let remote_ip = client_ip(remote);
        let transport = transport_marker(request.version());
        let method = request.method().clone();
        let url = request_url(&request, scheme);

        let Some(client) = request_host(&request).and_then(|host| self.pool.resolve(host)) else {
            let err = ForwardError::InvalidDomain;
            logging::rejected_line(remote_ip, transport, &method, &url, &err, start.elapsed());
            metrics::record_request(method.as_str(), err.status().as_u16(), "-", start);
            return err.into_response();
        };
        let domain = client.route().domain();

        match self.deliver(client, remote_ip, request).await {
            Ok(response) => {
                logging::request_line(remote_ip, transport, Some(response.status()), &method, &url, start.elapsed());
                metrics::record_request(method.as_str(), response.status().as_u16(), domain, start);
                response
            }
            Err(err) => {
                logging::rejected_line(remote_ip, transport, &method, &url, &err, start.elapsed());
                metrics::record_request(method.as_str(), err.status().as_u16(), domain, start);
                err.into_response()
            }
        }
    }

    async fn deliver(
        &self,
        client: &OriginClient,
        remote_ip: std::net::IpAddr,
        request: Request<Body>,
    ) -> Result<Response, ForwardError> {
        let domain = client.route().domain();
        let unreachable = |cause: String| ForwardError::OriginUnreachable {
            domain: domain.to_string(),
            cause,
        };

        let caller_accepts_gzip = accepts_gzip(request.headers());
        let (parts, body) = request.into_parts();

        let outbound = OutboundRequest::new(&parts, client.route(), remote_ip, &self.secret).map_err(unreachable)?;
        let mut body = ReplayableBody::from_body(body, self.retry_body_limit)
            .await
            .map_err(|e| ForwardError::RequestBody(e.to_string()))?;

        let attempts = body.attempts(MAX_ATTEMPTS);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let Some(attempt_body) = body.take() else {
                break;
            };

            match client.send(outbound.build(attempt_body)).await {
                Ok(response) => {
                    if response.status().is_redirection() {
                        tracing::debug!(domain, status = %response.status(), "Passing redirect through");
                        metrics::record_attempt(domain, "redirect");
                    } else {
                        metrics::record_attempt(domain, "ok");
                    }
                    return Ok(relay(response, caller_accepts_gzip, &parts.method));
                }
                Err(e) => {
                    tracing::warn!(domain, attempt, error = %e, "Origin attempt failed");
                    metrics::record_attempt(domain, "error");
                    last_error = Some(e);
                }
            }
        }

        Err(unreachable(
            last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_responses() {
        let response = ForwardError::InvalidDomain.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad Request\n");

        let response = ForwardError::OriginUnreachable {
            domain: "a.com".into(),
            cause: "refused".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Could not reach origin\n");

        let response = ForwardError::RequestBody("connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad Request\n");
    }
}
