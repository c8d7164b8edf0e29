//! # Observability
//!
//! Services call [`init_with_config`] once at startup and then use plain
//! `tracing` macros. Where the lines end up is decided here:
//!
//! - default build: compact human-readable lines on stderr
//! - `dev` feature: one JSON object per line appended to a central file
//!   (`~/.blog-outbox/logs/relay.jsonl` unless overridden), plus stderr
//!
//! `RUST_LOG` overrides the configured default level in both modes.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "blog-outbox-relay".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! });
//! tracing::info!(batch = 12, "cycle finished");
//! ```

#[cfg(feature = "dev")]
mod dev;

#[cfg_attr(not(feature = "dev"), allow(dead_code))]
mod json_layer;

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Included in every JSON log line for filtering.
    pub service_name: String,

    /// Default filter (e.g. "info", "blog_outbox=debug").
    pub default_level: String,

    /// JSONL destination in dev mode.
    pub log_path: Option<PathBuf>,

    /// Also emit compact lines to stderr in dev mode.
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

/// Initialize with defaults and the given service name.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter(&config.default_level))
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .try_init();
    }
}

pub(crate) fn env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;
