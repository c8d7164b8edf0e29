//! Message broker clients.
//!
//! A broker publishes one [`ActivityNotification`] at a time. It never
//! retries on its own: a failed publish goes back to the dispatcher, which
//! schedules the next attempt through the outbox table.

use crate::{ActivityNotification, OutboxResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Publish failures. All are treated as transient by the dispatcher.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Broker rejected notification with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The endpoint could not be reached or did not answer in time.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

impl BrokerError {
    /// Connect failures and timeouts become `Unavailable`; other transport errors stay `Http`.
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            BrokerError::Unavailable(err.to_string())
        } else {
            BrokerError::Http(err)
        }
    }
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, notification: &ActivityNotification) -> Result<(), BrokerError>;
}

/// Writes notifications to the log. Used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroker;

#[async_trait]
impl Broker for LogBroker {
    async fn publish(&self, notification: &ActivityNotification) -> Result<(), BrokerError> {
        info!(
            notification_id = %notification.notification_id,
            activity_type = %notification.activity_type,
            entity_id = %notification.entity_id,
            title = %notification.title,
            "Activity notification"
        );
        Ok(())
    }
}

/// Webhook broker settings.
#[derive(Debug, Clone)]
pub struct HttpBrokerConfig {
    pub endpoint_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl HttpBrokerConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            auth_token: None,
            timeout_secs: 10,
        }
    }
}

/// POSTs each notification as JSON to a webhook endpoint.
///
/// The notification id travels in the `Idempotency-Key` header so the
/// receiver can drop redeliveries.
pub struct HttpBroker {
    config: HttpBrokerConfig,
    client: Client,
}

impl HttpBroker {
    pub fn new(config: HttpBrokerConfig) -> OutboxResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.config.endpoint_url
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn publish(&self, notification: &ActivityNotification) -> Result<(), BrokerError> {
        debug!(
            url = %self.config.endpoint_url,
            notification_id = %notification.notification_id,
            "Publishing notification"
        );

        let mut request = self
            .client
            .post(&self.config.endpoint_url)
            .header("Idempotency-Key", &notification.notification_id)
            .json(notification);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(BrokerError::from_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
