//! Dispatcher-side access to the outbox table.
//!
//! Every mutation is a single statement (or, for claims, one IMMEDIATE
//! transaction) run on the `AsyncDatabase` thread. "Now" always comes from
//! the injected clock.

use crate::{Clock, OutboxError, OutboxResult};
use blog_database::{queries, AsyncDatabase, OutboxRecord, OutboxStats, OutboxStatus};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct OutboxStore {
    db: AsyncDatabase,
    clock: Arc<dyn Clock>,
}

impl OutboxStore {
    pub fn new(db: AsyncDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Up to `batch_size` due records, oldest first, without claiming them.
    pub async fn fetch_due(&self, batch_size: usize) -> OutboxResult<Vec<OutboxRecord>> {
        let now = self.clock.now();
        let records = self
            .db
            .call(move |conn| queries::fetch_due_outbox_records(conn, now, batch_size))
            .await?;
        Ok(records)
    }

    /// Fetch due records and lease them to `worker_id` for `lease`.
    pub async fn claim_due(
        &self,
        batch_size: usize,
        worker_id: &str,
        lease: Duration,
    ) -> OutboxResult<Vec<OutboxRecord>> {
        let now = self.clock.now();
        let lease_until = now + lease;
        let worker_id = worker_id.to_string();
        let records = self
            .db
            .call_mut(move |conn| {
                queries::claim_due_outbox_records(conn, &worker_id, now, lease_until, batch_size)
            })
            .await?;
        Ok(records)
    }

    /// Extend the lease on a record `worker_id` still owns to `now + lease`.
    /// False means the claim was lost and the record must be left alone.
    pub async fn renew_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease: Duration,
    ) -> OutboxResult<bool> {
        let lease_until = self.clock.now() + lease;
        let worker_id = worker_id.to_string();
        let renewed = self
            .db
            .call(move |conn| queries::renew_outbox_claim(conn, id, &worker_id, lease_until))
            .await?;
        Ok(renewed)
    }

    /// Record a successful publish. False when the record is already
    /// delivered, missing, or no longer claimed by `worker_id`.
    pub async fn mark_delivered(&self, id: i64, worker_id: &str) -> OutboxResult<bool> {
        let now = self.clock.now();
        let worker_id = worker_id.to_string();
        let updated = self
            .db
            .call(move |conn| queries::mark_outbox_delivered(conn, id, &worker_id, now))
            .await?;
        if !updated {
            debug!(id, "Record already delivered, missing, or claimed elsewhere");
        }
        Ok(updated)
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        worker_id: &str,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> OutboxResult<bool> {
        let worker_id = worker_id.to_string();
        let error = error.to_string();
        let updated = self
            .db
            .call(move |conn| {
                queries::mark_outbox_failed(conn, id, &worker_id, &error, next_retry_at)
            })
            .await?;
        Ok(updated)
    }

    pub async fn mark_dead_lettered(
        &self,
        id: i64,
        worker_id: &str,
        error: &str,
    ) -> OutboxResult<bool> {
        let now = self.clock.now();
        let worker_id = worker_id.to_string();
        let error = error.to_string();
        let updated = self
            .db
            .call(move |conn| {
                queries::mark_outbox_dead_lettered(conn, id, &worker_id, &error, now)
            })
            .await?;
        Ok(updated)
    }

    /// Delete delivered records processed more than `days` days ago.
    pub async fn purge_delivered_older_than(&self, days: u32) -> OutboxResult<usize> {
        let cutoff = self.clock.now() - Duration::days(i64::from(days));
        let purged = self
            .db
            .call(move |conn| queries::purge_delivered_outbox_records(conn, cutoff))
            .await?;
        Ok(purged)
    }

    pub async fn get(&self, id: i64) -> OutboxResult<Option<OutboxRecord>> {
        Ok(self.db.call(move |conn| queries::get_outbox_record(conn, id)).await?)
    }

    pub async fn list(&self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        Ok(self
            .db
            .call(move |conn| queries::list_outbox_records(conn, limit))
            .await?)
    }

    pub async fn list_dead_lettered(&self, limit: usize) -> OutboxResult<Vec<OutboxRecord>> {
        Ok(self
            .db
            .call(move |conn| queries::list_dead_lettered_outbox_records(conn, limit))
            .await?)
    }

    pub async fn stats(&self) -> OutboxResult<OutboxStats> {
        let now = self.clock.now();
        Ok(self.db.call(move |conn| queries::outbox_stats(conn, now)).await?)
    }

    /// Make a pending or dead-lettered record due now with a fresh retry budget.
    pub async fn requeue(&self, id: i64) -> OutboxResult<()> {
        if self
            .db
            .call(move |conn| queries::requeue_outbox_record(conn, id))
            .await?
        {
            info!(id, "Outbox record requeued");
            return Ok(());
        }

        match self.get(id).await? {
            None => Err(OutboxError::NotFound(id)),
            Some(record) if record.status() == OutboxStatus::Delivered => {
                Err(OutboxError::AlreadyDelivered(id))
            }
            Some(_) => Err(OutboxError::NotFound(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use blog_database::NewOutboxRecord;

    fn start() -> DateTime<Utc> {
        "2025-03-01T12:00:00Z".parse().unwrap()
    }

    async fn setup() -> (OutboxStore, Arc<ManualClock>) {
        let db = AsyncDatabase::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(start()));
        (OutboxStore::new(db, clock.clone()), clock)
    }

    async fn seed(store: &OutboxStore, message_id: &str, created_at: DateTime<Utc>) -> i64 {
        let record = NewOutboxRecord {
            message_id: message_id.to_string(),
            event_kind: "CategoryCreated".to_string(),
            aggregate_id: "cat-1".to_string(),
            payload: "{}".to_string(),
            created_at,
        };
        store
            .database()
            .call(move |conn| queries::insert_outbox_record(conn, &record))
            .await
            .unwrap()
    }

    const WORKER: &str = "worker-a";

    /// Lease everything due to `WORKER`, as a dispatcher cycle would.
    async fn claim_all(store: &OutboxStore) -> Vec<OutboxRecord> {
        store.claim_due(50, WORKER, Duration::seconds(60)).await.unwrap()
    }

    #[tokio::test]
    async fn fetch_due_orders_by_creation_and_skips_future_retries() {
        let (store, _clock) = setup().await;
        let later = seed(&store, "m-2", start() + Duration::seconds(2)).await;
        let earlier = seed(&store, "m-1", start() + Duration::seconds(1)).await;
        let delayed = seed(&store, "m-3", start()).await;
        claim_all(&store).await;
        store
            .mark_failed(delayed, WORKER, "boom", start() + Duration::minutes(1))
            .await
            .unwrap();

        let ids: Vec<i64> = store.fetch_due(10).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![earlier, later]);
    }

    #[tokio::test]
    async fn fetch_due_respects_batch_size() {
        let (store, _clock) = setup().await;
        for n in 0..5 {
            seed(&store, &format!("m-{n}"), start()).await;
        }
        assert_eq!(store.fetch_due(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retry_becomes_due_when_clock_reaches_it() {
        let (store, clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;
        store
            .mark_failed(id, WORKER, "timeout", start() + Duration::minutes(2))
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        assert!(store.fetch_due(10).await.unwrap().is_empty());

        clock.advance(Duration::minutes(1));
        let due = store.fetch_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 1);
        assert_eq!(due[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn claims_exclude_other_workers_until_lease_expires() {
        let (store, clock) = setup().await;
        seed(&store, "m-1", start()).await;

        let first = claim_all(&store).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].claimed_by.as_deref(), Some(WORKER));

        let second = store.claim_due(10, "worker-b", Duration::seconds(60)).await.unwrap();
        assert!(second.is_empty());

        clock.advance(Duration::seconds(61));
        let third = store.claim_due(10, "worker-b", Duration::seconds(60)).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn renewing_keeps_the_record_away_from_other_workers() {
        let (store, clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;

        clock.advance(Duration::seconds(50));
        assert!(store.renew_claim(id, WORKER, Duration::seconds(60)).await.unwrap());

        // Past the original lease, inside the renewed one.
        clock.advance(Duration::seconds(20));
        let stolen = store.claim_due(10, "worker-b", Duration::seconds(60)).await.unwrap();
        assert!(stolen.is_empty());
        assert!(store.mark_delivered(id, WORKER).await.unwrap());
    }

    #[tokio::test]
    async fn mark_delivered_is_idempotent() {
        let (store, _clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;

        assert!(store.mark_delivered(id, WORKER).await.unwrap());
        assert!(!store.mark_delivered(id, WORKER).await.unwrap());

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status(), OutboxStatus::Delivered);
        assert_eq!(record.processed_at, Some(start()));
    }

    #[tokio::test]
    async fn dead_letter_then_requeue() {
        let (store, _clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;

        store.mark_dead_lettered(id, WORKER, "bad payload").await.unwrap();
        assert!(store.fetch_due(10).await.unwrap().is_empty());
        assert_eq!(store.list_dead_lettered(10).await.unwrap().len(), 1);
        assert_eq!(store.stats().await.unwrap().dead_lettered, 1);

        store.requeue(id).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.status(), OutboxStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.error.is_none());
        assert_eq!(store.fetch_due(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn requeue_rejects_delivered_and_missing_records() {
        let (store, _clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;
        store.mark_delivered(id, WORKER).await.unwrap();

        assert!(matches!(
            store.requeue(id).await,
            Err(OutboxError::AlreadyDelivered(found)) if found == id
        ));
        assert!(matches!(store.requeue(999).await, Err(OutboxError::NotFound(999))));
    }

    #[tokio::test]
    async fn purge_uses_processed_at_against_clock() {
        let (store, clock) = setup().await;
        let id = seed(&store, "m-1", start()).await;
        claim_all(&store).await;
        store.mark_delivered(id, WORKER).await.unwrap();

        clock.advance(Duration::days(7));
        assert_eq!(store.purge_delivered_older_than(7).await.unwrap(), 0);

        clock.advance(Duration::seconds(1));
        assert_eq!(store.purge_delivered_older_than(7).await.unwrap(), 1);
        assert!(store.get(id).await.unwrap().is_none());
    }
}
