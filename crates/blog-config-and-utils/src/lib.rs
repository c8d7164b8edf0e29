//! Configuration, paths, and logging setup for the outbox relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{BrokerSettings, Config, OutboxSettings, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
