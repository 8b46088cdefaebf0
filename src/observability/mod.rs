//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (Logger: structured events, bound fields)
//!     → encoding.rs (console / JSON line rendering)
//!     → rotation.rs (size-rotated file destination)
//!
//! Consumers:
//!     → stdout (console encoding)
//!     → rotating file and dedicated request log (JSON lines)
//! ```
//!
//! # Design Decisions
//! - The logger is an owned value passed through `AppState`, not a global
//! - Every record fans out to all sinks; each sink filters by its own level
//! - Request ID flows through a span bound on the per-request logger

pub mod encoding;
pub mod logging;
pub mod rotation;

pub use logging::{parse_level, Destination, Encoding, LogError, Logger, Sink};
pub use rotation::{RotatingFile, RotationPolicy};
