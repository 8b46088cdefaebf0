//! Record encoders for the log sinks.
//!
//! Both encoders see the same data: time, level, caller, message, the fields
//! bound on every enclosing span (root first) and the event's own fields.
//! Span fields are read back from the `JsonFields` storage the fmt layer
//! keeps in span extensions, so layers using these encoders must be built
//! with `.fmt_fields(JsonFields::new())`.

use std::fmt;

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{JsonFields, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormattedFields};
use tracing_subscriber::registry::LookupSpan;

/// Events with this target are rendered with level `FATAL`.
pub const FATAL_TARGET: &str = "fatal";

/// Line-delimited JSON: `{"time":..,"level":..,"caller":..,"msg":..,..fields}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

/// Tab-separated console lines: `time LEVEL caller msg {fields}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleFormat;

struct Record {
    time: String,
    level: &'static str,
    caller: Option<String>,
    message: String,
    fields: Map<String, Value>,
}

impl Record {
    fn collect<S>(ctx: &FmtContext<'_, S, JsonFields>, event: &Event<'_>) -> Self
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let meta = event.metadata();
        let mut fields = Map::new();

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                let extensions = span.extensions();
                let Some(stored) = extensions.get::<FormattedFields<JsonFields>>() else {
                    continue;
                };
                if let Ok(Value::Object(bound)) = serde_json::from_str::<Value>(&stored.fields) {
                    fields.extend(bound);
                }
            }
        }

        let mut visitor = FieldVisitor {
            message: String::new(),
            fields,
        };
        event.record(&mut visitor);

        let level = if meta.target() == FATAL_TARGET {
            "FATAL"
        } else {
            meta.level().as_str()
        };

        Self {
            time: format_timestamp(&Local::now()),
            level,
            caller: meta.file().map(|file| short_caller(file, meta.line())),
            message: visitor.message,
            fields: visitor.fields,
        }
    }
}

impl<S> FormatEvent<S, JsonFields> for JsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, JsonFields>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = Record::collect(ctx, event);

        let mut line = Map::new();
        line.insert("time".into(), Value::String(record.time));
        line.insert("level".into(), Value::String(record.level.to_string()));
        if let Some(caller) = record.caller {
            line.insert("caller".into(), Value::String(caller));
        }
        line.insert("msg".into(), Value::String(record.message));
        for (key, value) in record.fields {
            line.entry(key).or_insert(value);
        }

        let encoded = serde_json::to_string(&Value::Object(line)).map_err(|_| fmt::Error)?;
        writeln!(writer, "{encoded}")
    }
}

impl<S> FormatEvent<S, JsonFields> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, JsonFields>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let record = Record::collect(ctx, event);

        write!(writer, "{}\t{}", record.time, record.level)?;
        if let Some(caller) = &record.caller {
            write!(writer, "\t{caller}")?;
        }
        write!(writer, "\t{}", record.message)?;
        if !record.fields.is_empty() {
            let encoded =
                serde_json::to_string(&Value::Object(record.fields)).map_err(|_| fmt::Error)?;
            write!(writer, "\t{encoded}")?;
        }
        writeln!(writer)
    }
}

/// Collects event fields as JSON values; `message` is kept apart.
struct FieldVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

/// ISO-8601 with millisecond precision; `Z` for UTC offsets.
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trim a source path to its last directory and file name.
pub fn short_caller(file: &str, line: Option<u32>) -> String {
    let trimmed = match file.rfind(['/', '\\']) {
        Some(last) => match file[..last].rfind(['/', '\\']) {
            Some(prev) => &file[prev + 1..],
            None => file,
        },
        None => file,
    };
    match line {
        Some(line) => format!("{trimmed}:{line}"),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_short_caller_keeps_last_directory() {
        assert_eq!(
            short_caller("src/http/middleware/request_log.rs", Some(42)),
            "middleware/request_log.rs:42"
        );
        assert_eq!(short_caller("src/main.rs", Some(7)), "src/main.rs:7");
        assert_eq!(short_caller("main.rs", None), "main.rs");
        assert_eq!(short_caller(r"src\http\server.rs", Some(1)), r"http\server.rs:1");
    }

    #[test]
    fn test_timestamp_has_millis_and_zone() {
        let utc = "2024-01-02T03:04:05.678901Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(format_timestamp(&utc), "2024-01-02T03:04:05.678Z");

        let offset = utc.with_timezone(&FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(format_timestamp(&offset), "2024-01-02T11:04:05.678+08:00");
    }
}
