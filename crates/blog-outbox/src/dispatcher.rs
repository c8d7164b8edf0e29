//! Background dispatcher that drains the outbox.
//!
//! Each cycle claims a batch of due records, converts and publishes them
//! one at a time in creation order, records each outcome, then runs the
//! retention sweep. The lease on a record is renewed right before it is
//! published, and every outcome write is conditional on still owning it.
//! Between cycles the loop sleeps for the processing interval and wakes
//! early when asked to stop.

use crate::{
    Broker, ConverterRegistry, OutboxResult, OutboxStore, RetentionSweeper, RetryDecision,
    RetryPolicy,
};
use blog_config_and_utils::OutboxSettings;
use blog_database::OutboxRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub processing_interval: Duration,
    pub max_retry_count: u32,
    pub retention_days: u32,
    pub claim_lease: chrono::Duration,
    /// Identifies this instance in `claimed_by`.
    pub worker_id: String,
}

fn new_worker_id() -> String {
    format!("relay-{}", Uuid::new_v4())
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&OutboxSettings::default())
    }
}

impl From<&OutboxSettings> for DispatcherConfig {
    fn from(settings: &OutboxSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            processing_interval: Duration::from_secs(settings.processing_interval_secs),
            max_retry_count: settings.max_retry_count,
            retention_days: settings.retention_days,
            claim_lease: chrono::Duration::seconds(
                i64::try_from(settings.claim_lease_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
            worker_id: new_worker_id(),
        }
    }
}

/// What happened during one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub delivered: usize,
    pub retry_scheduled: usize,
    pub conversion_failed: usize,
    pub exhausted: usize,
    /// Records another worker took over before this one finished them.
    pub claims_lost: usize,
    /// Outcomes that could not be written; the lease hands those records back later.
    pub store_errors: usize,
    pub purged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    RetryScheduled,
    ConversionFailed,
    Exhausted,
    ClaimLost,
}

/// `outcome` if the write landed, `ClaimLost` if another worker owns the record now.
fn owned(record: &OutboxRecord, written: bool, outcome: Outcome) -> Outcome {
    if written {
        return outcome;
    }
    warn!(
        record_id = record.id,
        outcome = ?outcome,
        "Claim lost during publish, outcome left to the new owner"
    );
    Outcome::ClaimLost
}

pub struct OutboxDispatcher {
    store: OutboxStore,
    converters: Arc<ConverterRegistry>,
    broker: Arc<dyn Broker>,
    retry_policy: RetryPolicy,
    sweeper: RetentionSweeper,
    config: DispatcherConfig,
}

impl OutboxDispatcher {
    pub fn new(
        store: OutboxStore,
        converters: ConverterRegistry,
        broker: Arc<dyn Broker>,
        config: DispatcherConfig,
    ) -> Self {
        let retry_policy = RetryPolicy::new(config.max_retry_count);
        let sweeper = RetentionSweeper::new(store.clone(), config.retention_days);
        Self {
            store,
            converters: Arc::new(converters),
            broker,
            retry_policy,
            sweeper,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run one fetch, process, sweep pass.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self
            .store
            .claim_due(self.config.batch_size, &self.config.worker_id, self.config.claim_lease)
            .await
        {
            Ok(batch) => {
                report.fetched = batch.len();
                if !batch.is_empty() {
                    debug!(batch_size = batch.len(), "Processing outbox batch");
                }
                for record in &batch {
                    match self.process(record).await {
                        Ok(Outcome::Delivered) => report.delivered += 1,
                        Ok(Outcome::RetryScheduled) => report.retry_scheduled += 1,
                        Ok(Outcome::ConversionFailed) => report.conversion_failed += 1,
                        Ok(Outcome::Exhausted) => report.exhausted += 1,
                        Ok(Outcome::ClaimLost) => report.claims_lost += 1,
                        Err(e) => {
                            report.store_errors += 1;
                            error!(
                                record_id = record.id,
                                error = %e,
                                "Failed to record outbox outcome, leaving record for lease expiry"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.store_errors += 1;
                error!(error = %e, "Failed to fetch due outbox records");
            }
        }

        match self.sweeper.sweep().await {
            Ok(purged) => report.purged = purged,
            Err(e) => warn!(error = %e, "Retention sweep failed"),
        }

        report
    }

    async fn process(&self, record: &OutboxRecord) -> OutboxResult<Outcome> {
        let worker_id = self.config.worker_id.as_str();
        if !self
            .store
            .renew_claim(record.id, worker_id, self.config.claim_lease)
            .await?
        {
            warn!(record_id = record.id, "Claim lost before publish, skipping record");
            return Ok(Outcome::ClaimLost);
        }

        let notification = match self.converters.convert(record) {
            Ok(notification) => notification,
            Err(e) => {
                error!(
                    record_id = record.id,
                    event_kind = %record.event_kind,
                    error = %e,
                    "Outbox record cannot be converted, dead-lettering"
                );
                let written = self
                    .store
                    .mark_dead_lettered(record.id, worker_id, &e.to_string())
                    .await?;
                return Ok(owned(record, written, Outcome::ConversionFailed));
            }
        };

        let e = match self.broker.publish(&notification).await {
            Ok(()) => {
                let written = self.store.mark_delivered(record.id, worker_id).await?;
                if written {
                    debug!(
                        record_id = record.id,
                        notification_id = %notification.notification_id,
                        "Outbox record delivered"
                    );
                }
                return Ok(owned(record, written, Outcome::Delivered));
            }
            Err(e) => e,
        };

        let attempts = record.retry_count.saturating_add(1);
        match self.retry_policy.decide(record.retry_count, self.store.clock().now()) {
            RetryDecision::RetryAt(next_retry_at) => {
                warn!(
                    record_id = record.id,
                    attempts,
                    next_retry_at = %next_retry_at,
                    error = %e,
                    "Publish failed, retry scheduled"
                );
                let written = self
                    .store
                    .mark_failed(record.id, worker_id, &e.to_string(), next_retry_at)
                    .await?;
                Ok(owned(record, written, Outcome::RetryScheduled))
            }
            RetryDecision::Exhausted => {
                error!(
                    record_id = record.id,
                    attempts,
                    error = %e,
                    "Publish failed, retries exhausted"
                );
                let reason = format!("exhausted after {attempts} attempts: {e}");
                let written = self
                    .store
                    .mark_dead_lettered(record.id, worker_id, &reason)
                    .await?;
                Ok(owned(record, written, Outcome::Exhausted))
            }
        }
    }

    /// Spawn the loop on the current runtime.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        DispatcherHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            interval_secs = self.config.processing_interval.as_secs(),
            "Outbox dispatcher started"
        );

        loop {
            // A dropped handle counts as a stop request.
            if !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
                break;
            }

            let report = self.run_cycle().await;
            if report.fetched > 0 || report.purged > 0 {
                info!(
                    fetched = report.fetched,
                    delivered = report.delivered,
                    retry_scheduled = report.retry_scheduled,
                    dead_lettered = report.conversion_failed + report.exhausted,
                    claims_lost = report.claims_lost,
                    purged = report.purged,
                    "Outbox cycle complete"
                );
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.processing_interval) => {}
            }
        }

        info!(worker_id = %self.config.worker_id, "Outbox dispatcher stopped");
    }
}

/// Owns a running dispatcher task.
pub struct DispatcherHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for the current cycle to finish.
    pub async fn stop(self) -> OutboxResult<()> {
        let _ = self.shutdown_tx.send(());
        self.task.await?;
        Ok(())
    }
}
