//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, graceful shutdown)
//!     → request.rs (bind request ID + request logger)
//!     → middleware/request_log.rs (buffer body, time the chain, emit record)
//!     → panic recovery
//!     → handlers (version info, 404 / 405 fallbacks)
//! ```

pub mod middleware;
pub mod request;
pub mod server;

pub use request::{
    bind_request_logger, context_logger, RequestErrors, RequestId, RequestIdExt, RequestLogger,
    X_REQUEST_ID,
};
pub use server::{build_router, routes, with_middleware, AppState, HttpServer};
