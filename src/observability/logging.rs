//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from configuration
//! - Provide the `LogSink` facade used by `RequestContext`
//! - Render accumulated key/value fields onto every emitted record
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and the `RUST_LOG` environment variable

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// A single structured key/value pair attached to a log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogField {
    pub key: String,
    pub value: Value,
}

impl LogField {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Leveled sink for structured records.
///
/// Implementations must not panic: emitting a record is always best effort.
pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, message: &str, fields: &[LogField]);
}

/// Render fields as space-separated `key=value` pairs, preserving order.
pub fn render_fields(fields: &[LogField]) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&field.key);
        out.push('=');
        out.push_str(&field.value.to_string());
    }
    out
}

/// Sink forwarding records to the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: Level, message: &str, fields: &[LogField]) {
        let trace_id = fields
            .iter()
            .find(|f| f.key == "trace_id")
            .and_then(|f| f.value.as_str())
            .unwrap_or("-");
        let rendered = render_fields(fields);

        match level {
            Level::ERROR => tracing::error!(trace_id = %trace_id, fields = %rendered, "{}", message),
            Level::WARN => tracing::warn!(trace_id = %trace_id, fields = %rendered, "{}", message),
            Level::INFO => tracing::info!(trace_id = %trace_id, fields = %rendered, "{}", message),
            Level::DEBUG => tracing::debug!(trace_id = %trace_id, fields = %rendered, "{}", message),
            _ => tracing::trace!(trace_id = %trace_id, fields = %rendered, "{}", message),
        }
    }
}

/// A record captured by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<LogField>,
}

impl LogRecord {
    /// Value of the last field named `key`.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().rev().find(|f| f.key == key).map(|f| &f.value)
    }
}

/// In-memory sink that keeps every record. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.message == message)
            .cloned()
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, level: Level, message: &str, fields: &[LogField]) {
        self.records.lock().push(LogRecord {
            level,
            message: message.to_string(),
            fields: fields.to_vec(),
        });
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("account_service={0},tower_http={0}", config.level)));

    let json = config.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fields_keeps_order() {
        let fields = vec![
            LogField::new("trace_id", "abc"),
            LogField::new("status", 200),
            LogField::new("ok", true),
        ];
        assert_eq!(render_fields(&fields), "trace_id=\"abc\" status=200 ok=true");
    }

    #[test]
    fn test_recording_sink_captures() {
        let sink = RecordingSink::new();
        sink.emit(Level::WARN, "slow", &[LogField::new("ms", 1500)]);
        sink.emit(Level::INFO, "done", &[]);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(records[0].field("ms"), Some(&Value::from(1500)));
        assert_eq!(sink.with_message("done").len(), 1);
    }

    #[test]
    fn test_tracing_sink_without_subscriber_is_noop() {
        TracingSink.emit(Level::ERROR, "nothing installed", &[LogField::new("k", "v")]);
    }
}
