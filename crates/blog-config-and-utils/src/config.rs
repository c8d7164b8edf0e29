//! Configuration management for the relay.
//!
//! Values come from `config.json` under the base directory (defaults when
//! the file is absent), then selected `BLOG_*` environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Outbox capture and dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    /// Records fetched per dispatcher cycle.
    pub batch_size: usize,
    /// Sleep between cycles.
    pub processing_interval_secs: u64,
    /// Retries scheduled before a failing record is exhausted.
    pub max_retry_count: u32,
    /// Age after which delivered records are purged.
    pub retention_days: u32,
    /// How long a claimed batch stays reserved for this instance.
    pub claim_lease_secs: u64,
    /// Event kinds captured by the unit of work.
    pub event_allow_list: BTreeSet<String>,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            processing_interval_secs: 5,
            max_retry_count: 5,
            retention_days: 7,
            claim_lease_secs: 60,
            event_allow_list: blog_domain::default_allow_listed_kinds().into_iter().collect(),
        }
    }
}

/// Where notifications are published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Webhook endpoint. When unset, notifications are only logged.
    pub endpoint_url: Option<String>,
    /// Bearer token sent with each request.
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

/// Main relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub outbox: OutboxSettings,
    #[serde(default)]
    pub broker: BrokerSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            outbox: OutboxSettings::default(),
            broker: BrokerSettings::default(),
        }
    }
}

impl Config {
    /// Load from the config file (or defaults), apply env overrides, validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `BLOG_*` overrides read through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if let Some(level) = lookup("BLOG_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("BLOG_BROKER_URL") {
            self.broker.endpoint_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(raw) = lookup("BLOG_OUTBOX_BATCH_SIZE") {
            self.outbox.batch_size = parse_env("BLOG_OUTBOX_BATCH_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("BLOG_OUTBOX_INTERVAL_SECS") {
            self.outbox.processing_interval_secs = parse_env("BLOG_OUTBOX_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("BLOG_OUTBOX_MAX_RETRIES") {
            self.outbox.max_retry_count = parse_env("BLOG_OUTBOX_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("BLOG_OUTBOX_RETENTION_DAYS") {
            self.outbox.retention_days = parse_env("BLOG_OUTBOX_RETENTION_DAYS", &raw)?;
        }
        Ok(())
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.outbox.batch_size == 0 {
            return Err(CoreError::Config("outbox.batch_size must be > 0".to_string()));
        }
        if self.outbox.processing_interval_secs == 0 {
            return Err(CoreError::Config(
                "outbox.processing_interval_secs must be > 0".to_string(),
            ));
        }
        if self.outbox.max_retry_count == 0 {
            return Err(CoreError::Config("outbox.max_retry_count must be > 0".to_string()));
        }
        if self.outbox.claim_lease_secs == 0 {
            return Err(CoreError::Config("outbox.claim_lease_secs must be > 0".to_string()));
        }
        // A renewed lease has to outlast one publish.
        if self.outbox.claim_lease_secs <= self.broker.timeout_secs {
            return Err(CoreError::Config(format!(
                "outbox.claim_lease_secs ({}) must exceed broker.timeout_secs ({})",
                self.outbox.claim_lease_secs, self.broker.timeout_secs
            )));
        }
        self.broker_url()?;
        Ok(())
    }

    /// The broker endpoint as a parsed URL, if configured.
    pub fn broker_url(&self) -> CoreResult<Option<Url>> {
        self.broker
            .endpoint_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{key} has invalid value {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn default_config_matches_documented_values() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.outbox.batch_size, 50);
        assert_eq!(config.outbox.processing_interval_secs, 5);
        assert_eq!(config.outbox.max_retry_count, 5);
        assert_eq!(config.outbox.retention_days, 7);
        assert!(config.outbox.event_allow_list.contains("CategoryCreated"));
        assert!(!config.outbox.event_allow_list.contains("PostViewed"));
        assert!(config.broker.endpoint_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "log_level": "debug",
                "outbox": { "batch_size": 10, "event_allow_list": ["PostPublished"] }
            }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.outbox.batch_size, 10);
        assert_eq!(config.outbox.retention_days, 7);
        assert_eq!(config.outbox.event_allow_list.len(), 1);
        assert_eq!(config.broker.timeout_secs, 10);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.outbox.max_retry_count = 3;
        config.broker.endpoint_url = Some("https://hooks.example.com/activity".to_string());
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("BLOG_LOG_LEVEL", "trace"),
            ("BLOG_OUTBOX_BATCH_SIZE", "7"),
            ("BLOG_OUTBOX_MAX_RETRIES", "2"),
            ("BLOG_BROKER_URL", "http://localhost:8080/events"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.outbox.batch_size, 7);
        assert_eq!(config.outbox.max_retry_count, 2);
        assert_eq!(config.outbox.processing_interval_secs, 5);
        assert_eq!(
            config.broker_url().unwrap().unwrap().as_str(),
            "http://localhost:8080/events"
        );
    }

    #[test]
    fn invalid_env_number_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "BLOG_OUTBOX_RETENTION_DAYS").then(|| "a week".to_string()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_batch_and_bad_url() {
        let mut config = Config::default();
        config.outbox.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.broker.endpoint_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));
    }

    #[test]
    fn validate_rejects_leases_shorter_than_a_publish() {
        let mut config = Config::default();
        config.outbox.claim_lease_secs = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = Config::default();
        config.broker.timeout_secs = 30;
        config.outbox.claim_lease_secs = 30;
        assert!(config.validate().is_err());

        config.outbox.claim_lease_secs = 31;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::load(&paths).unwrap();
        assert_eq!(config.outbox.batch_size, Config::default().outbox.batch_size);
    }
}
