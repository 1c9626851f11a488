//! # Observability
//!
//! Structured logging for the field outbox workspace.
//!
//! Crates in the workspace only produce logs through the standard `tracing`
//! macros. The binary calls [`init_with_config`] once at startup, which wires
//! a JSONL file sink and an optional compact stderr sink behind a single
//! `EnvFilter`.
//!
//! Each JSONL line carries the timestamp, level, service name, pid, target,
//! message, and structured fields. Fields whose names look like secrets or
//! record payloads are redacted before they reach the file, so submission
//! contents never end up in logs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "field-outbox".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//!
//! tracing::info!(item_id = %id, "submission enqueued");
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;

pub use file::LogFileWriter;
pub use json_layer::{JsonLayer, LogEntry, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Custom log file path. Defaults to `~/.field-outbox/logs/outbox.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened, logging falls back to stderr only and
/// the failure is reported once through that fallback.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer};

    let log_path = config.log_path.clone().unwrap_or_else(file::default_log_path);
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let writer = match LogFileWriter::open(&log_path) {
        Ok(writer) => writer,
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(
                log_path = %log_path.display(),
                error = %e,
                "log file unavailable, logging to stderr only"
            );
            return;
        }
    };

    let json_layer = JsonLayer::new(config.service_name.clone(), writer);

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter()))
        .with(stderr_layer.map(|l| l.with_filter(env_filter())))
        .try_init();

    tracing::info!(
        log_path = %log_path.display(),
        service = %config.service_name,
        "observability initialized"
    );
}
