//! Logging initialization for the relay.
//!
//! Thin wrapper over the `observability` package so the binary has one call
//! to make at startup.

use std::path::PathBuf;

/// Initialize tracing for the relay process.
///
/// `RUST_LOG` still wins over `level` when set. With the `dev` feature of
/// `observability`, logs also go to `log_path` as JSONL.
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: "blog-outbox-relay".into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
