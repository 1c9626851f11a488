//! JSONL layer for structured logging.
//!
//! Produces one JSON object per event:
//! - timestamp (RFC 3339, microseconds)
//! - level
//! - service
//! - pid
//! - target (module path)
//! - message
//! - fields (structured key-value pairs, sensitive keys redacted)

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Replacement value written for redacted fields.
pub const REDACTED: &str = "[redacted]";

/// Field names never written verbatim. Submission payloads are opaque and may
/// carry personal data collected in the field.
const DENYLIST_KEYS: [&str; 8] = [
    "payload",
    "body",
    "token",
    "access_token",
    "authorization",
    "cookie",
    "password",
    "secret",
];

/// A single structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

fn is_sensitive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|key| lower.contains(key))
}

/// Collects an event's message and fields.
#[derive(Default)]
struct EventFields {
    fields: HashMap<String, serde_json::Value>,
    message: Option<String>,
}

impl EventFields {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        let name = field.name();
        let value = if is_sensitive(name) {
            serde_json::Value::from(REDACTED)
        } else {
            value
        };
        self.fields.insert(name.to_owned(), value);
    }

    fn text(&mut self, field: &Field, text: String) {
        match field.name() {
            "message" => self.message = Some(text),
            _ => self.insert(field, serde_json::Value::String(text)),
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.text(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.text(field, value.to_owned());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON number form.
        let value = serde_json::Number::from_f64(value)
            .map_or_else(|| value.to_string().into(), serde_json::Value::Number);
        self.insert(field, value);
    }
}

/// Layer that writes each event as one JSON line to `make_writer`.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            pid: std::process::id(),
            make_writer,
        }
    }

    fn entry<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> LogEntry
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let mut visited = EventFields::default();
        event.record(&mut visited);
        let meta = event.metadata();

        LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: meta.level().as_str().to_owned(),
            service: self.service.clone(),
            pid: self.pid,
            target: meta.target().to_owned(),
            message: visited.message.unwrap_or_default(),
            fields: visited.fields,
            span: ctx.event_span(event).map(|span| span.name().to_owned()),
            file: meta.file().map(str::to_owned),
            line: meta.line(),
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let entry = self.entry(event, &ctx);
        let Ok(mut line) = serde_json::to_vec(&entry) else {
            return;
        };
        line.push(b'\n');
        // A log line that cannot be written is dropped.
        let _ = self.make_writer.make_writer().write_all(&line);
    }
}
