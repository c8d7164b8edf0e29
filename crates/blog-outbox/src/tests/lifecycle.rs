//! Background task start and stop.

use super::*;
use tokio::time::{sleep, timeout};

async fn wait_for_published(broker: &ScriptedBroker, count: usize) {
    timeout(Duration::from_secs(5), async {
        while broker.published().len() < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dispatcher did not publish in time");
}

#[tokio::test]
async fn started_dispatcher_drains_outbox_and_stops() {
    let mut h = Harness::new().await;
    h.publish_post("Hello");
    h.publish_post("World");

    let handle = h.dispatcher().start();
    wait_for_published(&h.broker, 4).await;

    timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("stop timed out")
        .unwrap();

    let stats = h.store.stats().await.unwrap();
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn stop_interrupts_a_long_sleep() {
    let h = Harness::new().await;
    let handle = h
        .dispatcher_with(DispatcherConfig {
            processing_interval: Duration::from_secs(3600),
            ..Harness::config()
        })
        .start();

    sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    timeout(Duration::from_secs(2), handle.stop())
        .await
        .expect("stop did not interrupt the sleep")
        .unwrap();
}

#[tokio::test]
async fn records_staged_while_running_are_picked_up() {
    let mut h = Harness::new().await;
    let handle = h.dispatcher().start();

    sleep(Duration::from_millis(30)).await;
    h.publish_post("Late arrival");
    wait_for_published(&h.broker, 2).await;

    handle.stop().await.unwrap();
    assert_eq!(h.broker.attempts(), 2);
}

#[tokio::test]
async fn nothing_is_published_after_stop() {
    let mut h = Harness::new().await;
    let handle = h.dispatcher().start();
    handle.stop().await.unwrap();

    h.publish_post("After shutdown");
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.broker.attempts(), 0);
}
