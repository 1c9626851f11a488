//! Logging initialization for the outbox.
//!
//! Wraps the observability crate so every entry point configures logging the
//! same way: JSONL to `<base_dir>/logs/outbox.jsonl`, level from `RUST_LOG`
//! or the configured default.

use crate::Paths;
use observability::LogConfig;

/// Service name written into every log line.
const SERVICE_NAME: &str = "field-outbox";

/// Initialize the logging system.
///
/// # Arguments
///
/// * `level` - Default log level (trace, debug, info, warn, error)
/// * `paths` - Used to place the log file under the outbox base directory
/// * `also_stderr` - Mirror logs to stderr (foreground `run` mode)
pub fn init_logging(level: &str, paths: &Paths, also_stderr: bool) {
    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        also_stderr,
    });
}

/// Parse a log level name. Returns `None` for anything `EnvFilter` would not
/// treat as a plain level.
pub fn parse_level(level: &str) -> Option<tracing::Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(tracing::Level::TRACE),
        "debug" => Some(tracing::Level::DEBUG),
        "info" => Some(tracing::Level::INFO),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "error" => Some(tracing::Level::ERROR),
        _ => None,
    }
}
