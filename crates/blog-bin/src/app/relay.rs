//! Dispatcher process.

use blog_config_and_utils::{Config, Paths};
use blog_database::AsyncDatabase;
use blog_outbox::{
    Broker, ConverterRegistry, DispatcherConfig, HttpBroker, HttpBrokerConfig, LogBroker,
    OutboxDispatcher, OutboxResult, OutboxStore, SystemClock,
};
use std::sync::Arc;
use tracing::info;

/// Pick the broker from configuration: the webhook when an endpoint is set, the log otherwise.
pub(crate) fn build_broker(config: &Config) -> Result<Arc<dyn Broker>, Box<dyn std::error::Error>> {
    match config.broker_url()? {
        Some(url) => {
            info!(url = %url, "Publishing to webhook broker");
            let broker = HttpBroker::new(HttpBrokerConfig {
                endpoint_url: url.to_string(),
                auth_token: config.broker.auth_token.clone(),
                timeout_secs: config.broker.timeout_secs,
            })?;
            Ok(Arc::new(broker))
        }
        None => {
            info!("No broker endpoint configured, logging notifications");
            Ok(Arc::new(LogBroker))
        }
    }
}

pub(crate) async fn open_store(paths: &Paths) -> OutboxResult<OutboxStore> {
    let db = AsyncDatabase::open(&paths.database_file()).await?;
    Ok(OutboxStore::new(db, Arc::new(SystemClock)))
}

/// Run the dispatcher until Ctrl-C.
pub async fn run_relay(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;
    info!(
        base_dir = %paths.base_dir().display(),
        batch_size = config.outbox.batch_size,
        interval_secs = config.outbox.processing_interval_secs,
        max_retry_count = config.outbox.max_retry_count,
        retention_days = config.outbox.retention_days,
        "Starting blog outbox relay"
    );

    let store = open_store(&paths).await?;
    let broker = build_broker(&config)?;
    let dispatcher = OutboxDispatcher::new(
        store.clone(),
        ConverterRegistry::with_blog_events(),
        broker,
        DispatcherConfig::from(&config.outbox),
    );
    let handle = dispatcher.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    handle.stop().await?;
    store.database().clone().close().await?;
    info!("Relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_broker_without_endpoint() {
        assert!(build_broker(&Config::default()).is_ok());
    }

    #[test]
    fn webhook_broker_with_endpoint() {
        let mut config = Config::default();
        config.broker.endpoint_url = Some("http://127.0.0.1:9000/activity".to_string());
        assert!(build_broker(&config).is_ok());

        config.broker.endpoint_url = Some("::not a url::".to_string());
        assert!(build_broker(&config).is_err());
    }
}
