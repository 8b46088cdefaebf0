//! Per-request context: request ID, bound logger, private error list.
//!
//! All three live in the request's `http::Extensions` under their own
//! types, so each request sees only its own values.

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::server::AppState;
use crate::observability::Logger;

/// Header carrying the request ID back to the client.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Unique identifier of one request (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access to the request ID stored in extensions.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl RequestIdExt for Extensions {
    fn request_id(&self) -> Option<&RequestId> {
        self.get::<RequestId>()
    }
}

/// The logger bound to the current request.
///
/// As an extractor it never rejects: without a binding it yields the
/// application logger.
#[derive(Debug, Clone)]
pub struct RequestLogger(pub Logger);

impl std::ops::Deref for RequestLogger {
    type Target = Logger;

    fn deref(&self) -> &Logger {
        &self.0
    }
}

impl FromRequestParts<AppState> for RequestLogger {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(context_logger(Some(&parts.extensions), &state.logger).clone()))
    }
}

/// The logger bound to `extensions`, or `fallback` when there is none.
pub fn context_logger<'a>(extensions: Option<&'a Extensions>, fallback: &'a Logger) -> &'a Logger {
    extensions
        .and_then(|ext| ext.get::<RequestLogger>())
        .map(|bound| &bound.0)
        .unwrap_or(fallback)
}

/// Derive a logger carrying `id` from whatever is bound to `extensions`
/// and store both back.
pub fn bind_logger(extensions: &mut Extensions, fallback: &Logger, id: RequestId) -> Logger {
    let logger = context_logger(Some(&*extensions), fallback).with_request_id(id.as_str());
    extensions.insert(RequestLogger(logger.clone()));
    extensions.insert(id);
    logger
}

/// Middleware: bind a fresh request ID and logger, echo the ID header.
pub async fn bind_request_logger(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let id = RequestId::new();
    bind_logger(request.extensions_mut(), &state.logger, id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Private handler errors collected during one request.
///
/// Clones share the same list. Reported only in the request log record.
#[derive(Debug, Clone, Default)]
pub struct RequestErrors(Arc<Mutex<Vec<String>>>);

impl RequestErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, error: impl fmt::Display) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.to_string());
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Error #01: ...` lines, one per error; empty when none.
    pub fn summary(&self) -> String {
        let errors = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        errors
            .iter()
            .enumerate()
            .map(|(i, error)| format!("Error #{:02}: {}\n", i + 1, error))
            .collect()
    }
}

impl<S> FromRequestParts<S> for RequestErrors
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}
