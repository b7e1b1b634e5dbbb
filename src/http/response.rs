//! Response handling and transformation.
//!
//! # Responsibilities
//! - Copy the origin's status, headers and body to the caller
//! - Drop transport-internal header names (the `:` pseudo-header prefix)
//! - Decompress gzip bodies for callers that did not ask for gzip
//!   (responses without a body keep their headers untouched)
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body, decompression included
//! - Repaired responses lose `Content-Encoding` and `Content-Length`; the
//!   decoded length is unknown until the stream ends

use std::io;

use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Body;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderMap, Method, Response, StatusCode};
use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

/// Header names starting with this belong to the transport, not the message.
pub const TRANSPORT_INTERNAL_PREFIX: &str = ":";

pub fn is_transport_internal(name: &str) -> bool {
    name.starts_with(TRANSPORT_INTERNAL_PREFIX)
}

/// Whether any `Accept-Encoding` value mentions gzip.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("gzip"))
}

/// Whether the body is gzip and nothing else.
pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    let mut codings = headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty());

    matches!((codings.next(), codings.next()), (Some(c), None) if c.eq_ignore_ascii_case("gzip"))
}

/// Whether a response to `method` with `status` carries a message body.
///
/// HEAD answers, 1xx, 204 and 304 never do, whatever their headers claim.
pub fn has_body(method: &Method, status: StatusCode) -> bool {
    *method != Method::HEAD
        && !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

/// Whether the response must be decoded before it reaches the caller.
pub fn needs_gzip_repair(response_headers: &HeaderMap, caller_accepts_gzip: bool) -> bool {
    !caller_accepts_gzip && is_gzip_encoded(response_headers)
}

/// Turn an origin response to a `method` request into the caller's response.
pub fn relay(response: Response<Body>, caller_accepts_gzip: bool, method: &Method) -> Response<Body> {
    let (parts, body) = response.into_parts();
    let repair = has_body(method, parts.status) && needs_gzip_repair(&parts.headers, caller_accepts_gzip);

    let mut headers = HeaderMap::with_capacity(parts.headers.len());
    for (name, value) in parts.headers.iter() {
        if is_transport_internal(name.as_str()) {
            continue;
        }
        if repair && (*name == CONTENT_ENCODING || *name == CONTENT_LENGTH) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let body = if repair { gunzip(body) } else { body };

    let mut relayed = Response::new(body);
    *relayed.status_mut() = parts.status;
    *relayed.headers_mut() = headers;
    relayed
}

fn gunzip(body: Body) -> Body {
    let compressed = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let mut decoder = GzipDecoder::new(compressed);
    decoder.multiple_members(true);
    Body::from_stream(ReaderStream::new(decoder))
}
