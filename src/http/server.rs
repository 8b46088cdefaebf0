//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID binding, request log, panic recovery)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown

use std::net::SocketAddr;

use axum::{
    http::{Method, StatusCode, Uri},
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::SiteConfig;
use crate::http::middleware::request_log;
use crate::http::request::{bind_request_logger, RequestLogger};
use crate::observability::{LogError, Logger};
use crate::version::BuildInfo;

/// Application state injected into handlers and middleware.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application logger; fallback for requests without a binding.
    pub logger: Logger,
    /// Dedicated request log, when enabled.
    pub access_log: Option<Logger>,
    /// Longest body prefix kept in request records (0 = whole body).
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            access_log: None,
            max_body_bytes: crate::config::AccessLogConfig::default().max_body_bytes,
        }
    }

    /// State for the binary: opens the dedicated request log if configured.
    pub fn from_config(config: &SiteConfig, logger: Logger) -> Result<Self, LogError> {
        let access_log = if config.access_log.enabled {
            Some(Logger::file(&config.access_log.file_path)?)
        } else {
            None
        };
        Ok(Self {
            logger,
            access_log,
            max_body_bytes: config.access_log.max_body_bytes,
        })
    }
}

/// HTTP server for the site.
pub struct HttpServer {
    router: Router,
    logger: Logger,
}

impl HttpServer {
    /// Create a new HTTP server serving the site routes.
    pub fn new(state: AppState) -> Self {
        let logger = state.logger.clone();
        Self {
            router: build_router(state),
            logger,
        }
    }

    /// Serve a prepared router instead of the site routes.
    pub fn with_router(router: Router, logger: Logger) -> Self {
        Self { router, logger }
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        self.logger.in_scope(|| {
            tracing::info!(address = %addr, "HTTP server starting");
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let logger = self.logger.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                logger.info("Shutdown signal received, draining connections");
            })
            .await?;

        self.logger.info("HTTP server stopped");
        Ok(())
    }
}

/// Site routes with the full middleware stack.
pub fn build_router(state: AppState) -> Router {
    with_middleware(routes(), state)
}

/// Site routes without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        // `get` would also answer HEAD; `/` is GET only.
        .route(
            "/",
            get(version)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
}

/// Wrap `router` in the request middleware and attach `state`.
///
/// Outermost first: request ID binding, request log, panic recovery.
pub fn with_middleware(router: Router<AppState>, state: AppState) -> Router {
    router
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(state.clone(), request_log))
        .layer(middleware::from_fn_with_state(state.clone(), bind_request_logger))
        .with_state(state)
}

async fn version(logger: RequestLogger) -> String {
    logger.debug("serving build info");
    BuildInfo::current().to_string()
}

async fn not_found(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Invalid path: {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> (StatusCode, String) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Method not allowed: {} {}", method, uri.path()),
    )
}
