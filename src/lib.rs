//! Sample site server library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod version;

pub use config::SiteConfig;
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use observability::Logger;
