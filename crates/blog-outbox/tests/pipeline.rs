//! Outbox pipeline driven through the public API only.

use async_trait::async_trait;
use blog_database::{queries, AsyncDatabase, Database, NewOutboxRecord, OutboxStatus};
use blog_domain::{Aggregate, Category, Post, User};
use blog_outbox::{
    ActivityNotification, Broker, BrokerError, ConverterRegistry, DispatcherConfig,
    EventAllowList, LogBroker, ManualClock, OutboxDispatcher, OutboxStore, UnitOfWork,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

#[derive(Default)]
struct Collector {
    received: Mutex<Vec<ActivityNotification>>,
}

#[async_trait]
impl Broker for Collector {
    async fn publish(&self, notification: &ActivityNotification) -> Result<(), BrokerError> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn start() -> DateTime<Utc> {
    "2025-06-01T08:00:00Z".parse().unwrap()
}

fn config() -> DispatcherConfig {
    DispatcherConfig {
        processing_interval: Duration::from_millis(10),
        worker_id: "integration".to_string(),
        ..DispatcherConfig::default()
    }
}

#[tokio::test]
async fn commit_then_dispatch_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blog.db");
    let mut db = Database::open(&path).unwrap();
    let clock = Arc::new(ManualClock::new(start()));

    let uow = UnitOfWork::new(EventAllowList::default(), clock.clone());
    let mut user = User::register("grace", "grace@example.com").unwrap();
    let mut category = Category::create("Compilers", user.id()).unwrap();
    let mut post = Post::create("COBOL", "body", Some(category.id()), user.id()).unwrap();
    post.publish(user.id()).unwrap();
    post.record_view(None).unwrap();

    let summary = uow
        .commit(db.connection_mut(), &mut [&mut user, &mut category, &mut post])
        .unwrap();
    assert_eq!(summary.staged, 4);
    assert_eq!(summary.dropped, 1);

    let store = OutboxStore::new(AsyncDatabase::open(&path).await.unwrap(), clock.clone());
    let broker = Arc::new(Collector::default());
    let dispatcher = OutboxDispatcher::new(
        store.clone(),
        ConverterRegistry::with_blog_events(),
        broker.clone(),
        config(),
    );

    let report = dispatcher.run_cycle().await;
    assert_eq!(report.delivered, 4);

    let types: Vec<String> = broker
        .received
        .lock()
        .unwrap()
        .iter()
        .map(|n| n.activity_type.clone())
        .collect();
    assert_eq!(
        types,
        vec!["user.registered", "category.created", "post.created", "post.published"]
    );

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.pending, 0);
    assert!(stats.oldest_pending_at.is_none());
}

#[derive(Deserialize)]
struct NewsletterSent {
    issue: u32,
    recipients: u64,
}

fn newsletter_sent(
    event: NewsletterSent,
    record: &blog_database::OutboxRecord,
) -> ActivityNotification {
    ActivityNotification {
        notification_id: record.message_id.clone(),
        activity_type: "newsletter.sent".to_string(),
        entity_type: "newsletter".to_string(),
        entity_id: record.aggregate_id.clone(),
        title: format!("Issue #{} sent", event.issue),
        details: Some(serde_json::json!({ "recipients": event.recipients })),
        actor_id: None,
        occurred_at: record.created_at,
    }
}

#[tokio::test]
async fn custom_kinds_need_only_a_registered_converter() {
    let db = AsyncDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = OutboxStore::new(db, clock.clone());

    store
        .database()
        .call(|conn| {
            queries::insert_outbox_record(
                conn,
                &NewOutboxRecord {
                    message_id: "newsletter-12".to_string(),
                    event_kind: "NewsletterSent".to_string(),
                    aggregate_id: "newsletter".to_string(),
                    payload: r#"{"issue": 12, "recipients": 3400}"#.to_string(),
                    created_at: "2025-06-01T08:00:00Z".parse().unwrap(),
                },
            )
        })
        .await
        .unwrap();

    let mut converters = ConverterRegistry::with_blog_events();
    converters.register_json::<NewsletterSent>("NewsletterSent", newsletter_sent);
    let broker = Arc::new(Collector::default());
    let dispatcher = OutboxDispatcher::new(store.clone(), converters, broker.clone(), config());

    assert_eq!(dispatcher.run_cycle().await.delivered, 1);
    let received = broker.received.lock().unwrap().clone();
    assert_eq!(received[0].title, "Issue #12 sent");
    assert_eq!(received[0].notification_id, "newsletter-12");

    let record = store.list(10).await.unwrap().remove(0);
    assert_eq!(record.status(), OutboxStatus::Delivered);
}

#[tokio::test]
async fn log_broker_runs_the_background_loop() {
    let db = AsyncDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = OutboxStore::new(db, clock.clone());

    let handle = OutboxDispatcher::new(
        store.clone(),
        ConverterRegistry::with_blog_events(),
        Arc::new(LogBroker),
        config(),
    )
    .start();
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.stop().await.unwrap();

    assert_eq!(store.stats().await.unwrap().pending, 0);
}
