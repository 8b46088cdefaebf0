//! Structured logging.
//!
//! A [`Logger`] owns a `tracing` dispatcher built from a set of [`Sink`]s.
//! Every record is fanned out to all sinks, each filtered by its own level.
//! Child loggers carry extra bound fields on a span that encloses every
//! record they emit.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::dispatcher::{self, Dispatch, SetGlobalDefaultError};
use tracing::Span;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

use crate::config::LogConfig;
use crate::observability::encoding::{ConsoleFormat, JsonFormat, FATAL_TARGET};
use crate::observability::rotation::{RotatingFile, RotationPolicy};

/// Errors raised while building a logger.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("unrecognized log level: {0:?}")]
    InvalidLevel(String),

    #[error("failed to open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("a global logger is already installed: {0}")]
    Global(#[from] SetGlobalDefaultError),
}

/// Parse a level name (case-insensitive).
///
/// `dpanic`, `panic` and `fatal` are accepted and filter like `error`.
pub fn parse_level(level: &str) -> Result<LevelFilter, LogError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" | "dpanic" | "panic" | "fatal" => Ok(LevelFilter::ERROR),
        _ => Err(LogError::InvalidLevel(level.to_string())),
    }
}

/// How a sink renders records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Tab-separated, human readable.
    Console,
    /// One JSON object per line.
    Json,
}

/// Where a sink writes.
pub enum Destination {
    Stdout,
    File(RotatingFile),
    Writer(BoxMakeWriter),
}

/// One output of a logger.
pub struct Sink {
    pub encoding: Encoding,
    pub destination: Destination,
    pub level: LevelFilter,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

impl Sink {
    /// Human-readable records on stdout.
    pub fn console(level: LevelFilter) -> Self {
        Self {
            encoding: Encoding::Console,
            destination: Destination::Stdout,
            level,
        }
    }

    /// JSON records appended to a rotating file.
    pub fn file(file: RotatingFile, level: LevelFilter) -> Self {
        Self {
            encoding: Encoding::Json,
            destination: Destination::File(file),
            level,
        }
    }

    /// Records written to an arbitrary writer factory.
    pub fn writer<W>(make_writer: W, encoding: Encoding, level: LevelFilter) -> Self
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        Self {
            encoding,
            destination: Destination::Writer(BoxMakeWriter::new(make_writer)),
            level,
        }
    }

    fn into_layer(self) -> BoxedLayer {
        let writer = match self.destination {
            Destination::Stdout => BoxMakeWriter::new(io::stdout),
            Destination::File(file) => BoxMakeWriter::new(file),
            Destination::Writer(writer) => writer,
        };
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .fmt_fields(JsonFields::new());

        match self.encoding {
            Encoding::Console => layer
                .event_format(ConsoleFormat)
                .with_filter(self.level)
                .boxed(),
            Encoding::Json => layer
                .event_format(JsonFormat)
                .with_filter(self.level)
                .boxed(),
        }
    }
}

/// A structured logger. Cloning is cheap; clones share sinks.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    span: Span,
    fields: Arc<[(&'static str, String)]>,
}

impl Logger {
    /// Build the process logger: console always, rotating JSON file when
    /// `send_to_file` is set.
    pub fn new(config: &LogConfig) -> Result<Self, LogError> {
        let level = parse_level(&config.level)?;

        let mut sinks = vec![Sink::console(level)];
        if config.send_to_file {
            let policy = RotationPolicy::from_limits(
                config.max_size_mb,
                config.max_age_days,
                config.max_backups,
            );
            sinks.push(Sink::file(open_file(&config.file_path, policy)?, level));
        }

        Ok(Self::from_sinks(sinks))
    }

    /// A standalone logger writing JSON at debug and above to `path`,
    /// with no rotation limits.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let file = open_file(path.as_ref(), RotationPolicy::unbounded())?;
        Ok(Self::from_sinks([Sink::file(file, LevelFilter::DEBUG)]))
    }

    pub fn from_sinks(sinks: impl IntoIterator<Item = Sink>) -> Self {
        let layers: Vec<BoxedLayer> = sinks.into_iter().map(Sink::into_layer).collect();
        let subscriber = Registry::default().with(layers);

        Self {
            dispatch: Dispatch::new(subscriber),
            span: Span::none(),
            fields: Arc::from(Vec::new()),
        }
    }

    /// Make this logger the process-wide default for plain `tracing` macros.
    ///
    /// Fails if a default has already been installed.
    pub fn install_global(&self) -> Result<(), LogError> {
        dispatcher::set_global_default(self.dispatch.clone())?;
        Ok(())
    }

    /// Derive a child logger carrying `request_id` on every record.
    pub fn with_request_id(&self, request_id: &str) -> Self {
        // ERROR level keeps the span enabled in every sink that is enabled at all.
        let span = dispatcher::with_default(&self.dispatch, || {
            tracing::error_span!(parent: &self.span, "request", request_id = %request_id)
        });

        let mut fields = self.fields.to_vec();
        fields.push(("request_id", request_id.to_string()));

        Self {
            dispatch: self.dispatch.clone(),
            span,
            fields: fields.into(),
        }
    }

    /// Fields bound by this logger and its ancestors, oldest first.
    pub fn fields(&self) -> &[(&'static str, String)] {
        &self.fields
    }

    /// The most recently bound request id, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(key, _)| *key == "request_id")
            .map(|(_, value)| value.as_str())
    }

    /// Run `f` with this logger as the current dispatcher and its bound
    /// span entered, so `tracing` macros inside emit through it.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, || self.span.in_scope(f))
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.in_scope(|| tracing::debug!("{msg}"));
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.in_scope(|| tracing::info!("{msg}"));
    }

    pub fn warning(&self, msg: impl fmt::Display) {
        self.in_scope(|| tracing::warn!("{msg}"));
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.in_scope(|| tracing::error!("{msg}"));
    }

    /// Emit at `FATAL` and exit the process with status 1.
    pub fn fatal(&self, msg: impl fmt::Display) -> ! {
        self.in_scope(|| tracing::error!(target: FATAL_TARGET, "{msg}"));
        std::process::exit(1)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("fields", &self.fields).finish()
    }
}

fn open_file(path: impl AsRef<Path>, policy: RotationPolicy) -> Result<RotatingFile, LogError> {
    let path = path.as_ref();
    RotatingFile::open(path, policy).map_err(|source| LogError::File {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_level("trace").unwrap(), LevelFilter::TRACE);
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("INFO").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("Warning").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("error").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("dpanic").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("Panic").unwrap(), LevelFilter::ERROR);
        assert_eq!(parse_level("FATAL").unwrap(), LevelFilter::ERROR);
        assert!(matches!(parse_level("verbose"), Err(LogError::InvalidLevel(l)) if l == "verbose"));
        assert!(parse_level("").is_err());
    }

    #[test]
    fn test_new_rejects_unknown_level() {
        let config = LogConfig {
            level: "loud".into(),
            ..LogConfig::default()
        };
        assert!(matches!(Logger::new(&config), Err(LogError::InvalidLevel(_))));
    }

    #[test]
    fn test_child_accumulates_fields() {
        let base = Logger::from_sinks([]);
        assert!(base.fields().is_empty());
        assert_eq!(base.request_id(), None);

        let child = base.with_request_id("abc");
        let grandchild = child.with_request_id("def");

        assert_eq!(child.request_id(), Some("abc"));
        assert_eq!(grandchild.request_id(), Some("def"));
        assert_eq!(grandchild.fields().len(), 2);
        assert!(base.fields().is_empty());
    }
}
