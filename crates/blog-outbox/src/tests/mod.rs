//! End-to-end tests for the outbox pipeline.
//!
//! - `capture.rs`   - staging in the unit of work, rollback, no event without cause
//! - `delivery.rs`  - publish path, ordering, idempotent consumption, claims
//! - `failures.rs`  - backoff, exhaustion, conversion failures, store errors
//! - `retention.rs` - retention sweep boundaries
//! - `lifecycle.rs` - background task start and stop

mod lifecycle;

use crate::{
    ActivityNotification, Broker, BrokerError, CommitSummary, ConverterRegistry, DispatcherConfig,
    EventAllowList, ManualClock, OutboxDispatcher, OutboxStore, TrackedAggregate, UnitOfWork,
};
use async_trait::async_trait;
use blog_database::{AsyncDatabase, Database, OutboxRecord};
use blog_domain::{Aggregate, Post};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) fn start_time() -> DateTime<Utc> {
    "2025-03-01T12:00:00Z".parse().unwrap()
}

/// Broker stub that records what it publishes and fails on demand.
#[derive(Default)]
pub(crate) struct ScriptedBroker {
    published: Mutex<Vec<ActivityNotification>>,
    attempts: Mutex<usize>,
    failures_left: Mutex<usize>,
    always_fail: Mutex<bool>,
}

impl ScriptedBroker {
    pub fn fail_next(&self, n: usize) {
        *self.failures_left.lock() = n;
    }

    pub fn fail_always(&self, on: bool) {
        *self.always_fail.lock() = on;
    }

    pub fn published(&self) -> Vec<ActivityNotification> {
        self.published.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn publish(&self, notification: &ActivityNotification) -> Result<(), BrokerError> {
        *self.attempts.lock() += 1;
        if *self.always_fail.lock() {
            return Err(BrokerError::Unavailable("broker down".to_string()));
        }
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(BrokerError::Unavailable("transient outage".to_string()));
            }
        }
        self.published.lock().push(notification.clone());
        Ok(())
    }
}

/// Consumer that applies each notification id at most once.
#[derive(Default)]
pub(crate) struct DedupConsumer {
    seen: HashSet<String>,
    pub applied: Vec<String>,
}

impl DedupConsumer {
    pub fn receive(&mut self, notification: &ActivityNotification) -> bool {
        if !self.seen.insert(notification.notification_id.clone()) {
            return false;
        }
        self.applied.push(notification.activity_type.clone());
        true
    }
}

/// A file-backed database shared by the unit of work and the dispatcher.
pub(crate) struct Harness {
    _dir: TempDir,
    pub db: Database,
    pub store: OutboxStore,
    pub clock: Arc<ManualClock>,
    pub broker: Arc<ScriptedBroker>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blog.db");
        let db = Database::open(&path).unwrap();
        let async_db = AsyncDatabase::open(&path).await.unwrap();
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = OutboxStore::new(async_db, clock.clone());
        Self {
            _dir: dir,
            db,
            store,
            clock,
            broker: Arc::new(ScriptedBroker::default()),
        }
    }

    pub fn uow(&self) -> UnitOfWork {
        UnitOfWork::new(EventAllowList::default(), self.clock.clone())
    }

    pub fn commit(&mut self, aggregates: &mut [&mut dyn TrackedAggregate]) -> CommitSummary {
        let uow = self.uow();
        uow.commit(self.db.connection_mut(), aggregates).unwrap()
    }

    /// Create and publish a post: two staged records.
    pub fn publish_post(&mut self, title: &str) -> Post {
        let mut post = Post::create(title, "body", None, "author-1").unwrap();
        post.publish("author-1").unwrap();
        self.commit(&mut [&mut post]);
        post
    }

    pub fn config() -> DispatcherConfig {
        DispatcherConfig {
            batch_size: 50,
            processing_interval: Duration::from_millis(10),
            max_retry_count: 5,
            retention_days: 7,
            claim_lease: chrono::Duration::seconds(60),
            worker_id: "worker-test".to_string(),
        }
    }

    pub fn dispatcher(&self) -> OutboxDispatcher {
        self.dispatcher_with(Self::config())
    }

    pub fn dispatcher_with(&self, config: DispatcherConfig) -> OutboxDispatcher {
        OutboxDispatcher::new(
            self.store.clone(),
            ConverterRegistry::with_blog_events(),
            self.broker.clone(),
            config,
        )
    }

    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.store.list(1000).await.unwrap()
    }
}

/// Create, commit, dispatch, consume.
#[tokio::test]
async fn basic_workflow() {
    let mut h = Harness::new().await;
    let post = h.publish_post("Hello outbox");

    let report = h.dispatcher().run_cycle().await;
    assert_eq!(report.fetched, 2);
    assert_eq!(report.delivered, 2);

    let published = h.broker.published();
    let types: Vec<&str> = published.iter().map(|n| n.activity_type.as_str()).collect();
    assert_eq!(types, vec!["post.created", "post.published"]);
    assert!(published.iter().all(|n| n.entity_id == post.id()));

    let records = h.records().await;
    assert!(records.iter().all(|r| r.processed_at == Some(start_time())));
    assert_eq!(h.store.stats().await.unwrap().delivered, 2);
}
