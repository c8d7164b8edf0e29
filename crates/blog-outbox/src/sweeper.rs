//! Retention sweep for delivered records.

use crate::{OutboxResult, OutboxStore};
use tracing::{debug, info};

/// Deletes delivered records older than the retention window.
///
/// Pending and dead-lettered records are never touched.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: OutboxStore,
    retention_days: u32,
}

impl RetentionSweeper {
    pub fn new(store: OutboxStore, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub async fn sweep(&self) -> OutboxResult<usize> {
        let purged = self
            .store
            .purge_delivered_older_than(self.retention_days)
            .await?;
        if purged > 0 {
            info!(purged, retention_days = self.retention_days, "Purged delivered outbox records");
        } else {
            debug!("Retention sweep found nothing to purge");
        }
        Ok(purged)
    }
}
