//! Request observability middleware.
//!
//! Buffers the whole request body, hands an identical body to the rest of
//! the chain, and emits one record once the chain has produced a
//! response.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use chrono::Local;

use crate::http::request::{context_logger, RequestErrors};
use crate::http::server::AppState;
use crate::observability::encoding::format_timestamp;
use crate::observability::Logger;

/// Everything logged about one completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLogRecord {
    pub status: u16,
    pub method: String,
    /// Path plus `?query` when the query is non-empty.
    pub path: String,
    pub body: String,
    /// Exact response body length, `None` when not known up front.
    pub size: Option<u64>,
    pub client_ip: String,
    pub user_agent: String,
    /// ISO-8601 start time with milliseconds.
    pub start: String,
    pub latency: Duration,
    pub error: String,
}

impl RequestLogRecord {
    /// Emit the record at info level with an empty message.
    pub fn emit(&self, logger: &Logger) {
        let size = self.size.map_or(-1, |n| n as i64);
        logger.in_scope(|| {
            tracing::info!(
                status = self.status,
                method = %self.method,
                path = %self.path,
                body = %self.body,
                size,
                client_ip = %self.client_ip,
                user_agent = %self.user_agent,
                start = %self.start,
                latency = ?self.latency,
                error = %self.error,
                ""
            )
        });
    }
}

/// `path` or `path?query`.
pub fn path_with_query(uri: &Uri) -> String {
    match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", uri.path(), query),
        _ => uri.path().to_string(),
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header_value("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|hop| !hop.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(real) = header_value("x-real-ip") {
        return real.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

pub async fn request_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started_at = Local::now();
    let timer = Instant::now();

    let path = path_with_query(request.uri());
    let method = request.method().to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(request.headers(), peer);
    let logger = context_logger(Some(request.extensions()), &state.logger).clone();

    let errors = RequestErrors::new();
    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(errors.clone());

    let captured = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            errors.push(format_args!("Failed to read request body: {e}"));
            Bytes::new()
        }
    };
    let response = next
        .run(Request::from_parts(parts, Body::from(captured.clone())))
        .await;

    let record = RequestLogRecord {
        status: response.status().as_u16(),
        method,
        path,
        body: logged_body(&captured, state.max_body_bytes),
        size: response.body().size_hint().exact(),
        client_ip,
        user_agent,
        start: format_timestamp(&started_at),
        latency: timer.elapsed(),
        error: errors.summary(),
    };

    record.emit(&logger);
    if let Some(access_log) = &state.access_log {
        match logger.request_id() {
            Some(id) => record.emit(&access_log.with_request_id(id)),
            None => record.emit(access_log),
        }
    }

    response
}

/// The body as logged: lossy UTF-8, cut to `limit` bytes unless `limit` is 0.
pub fn logged_body(body: &[u8], limit: usize) -> String {
    let shown = match limit {
        0 => body,
        limit => &body[..body.len().min(limit)],
    };
    String::from_utf8_lossy(shown).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_path_with_query() {
        let uri: Uri = "/x?a=1&b=2".parse().unwrap();
        assert_eq!(path_with_query(&uri), "/x?a=1&b=2");

        let uri: Uri = "/x".parse().unwrap();
        assert_eq!(path_with_query(&uri), "/x");

        let uri: Uri = "/x?".parse().unwrap();
        assert_eq!(path_with_query(&uri), "/x");
    }

    #[test]
    fn test_logged_body_prefix() {
        assert_eq!(logged_body(b"hello world", 0), "hello world");
        assert_eq!(logged_body(b"hello world", 5), "hello");
        assert_eq!(logged_body(b"hi", 5), "hi");
        assert_eq!(logged_body(b"", 5), "");
        // A cut inside a multi-byte character is replaced, not dropped.
        assert_eq!(logged_body("añb".as_bytes(), 2), "a\u{FFFD}");
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5123".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.7"));
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.7");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.1 , 198.51.100.2"),
        );
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.1");
    }
}
