//! Commit hook that stages outbox records atomically with business writes.
//!
//! ```ignore
//! let uow = UnitOfWork::new(EventAllowList::default(), Arc::new(SystemClock));
//! let mut post = Post::create("Hello", "...", None, "author-1")?;
//! post.publish("author-1")?;
//! let summary = uow.commit(db.connection_mut(), &mut [&mut post])?;
//! assert_eq!(summary.staged, 2);
//! ```

use crate::{Clock, EventAllowList, OutboxResult};
use blog_database::{queries, NewOutboxRecord, Persist};
use blog_domain::Aggregate;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// An aggregate the unit of work can both persist and drain.
pub trait TrackedAggregate: Aggregate + Persist {}

impl<T: Aggregate + Persist> TrackedAggregate for T {}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub aggregates: usize,
    /// Events written to the outbox.
    pub staged: usize,
    /// Events not on the allow-list.
    pub dropped: usize,
}

#[derive(Clone)]
pub struct UnitOfWork {
    allow_list: EventAllowList,
    clock: Arc<dyn Clock>,
}

impl UnitOfWork {
    pub fn new(allow_list: EventAllowList, clock: Arc<dyn Clock>) -> Self {
        Self { allow_list, clock }
    }

    pub fn allow_list(&self) -> &EventAllowList {
        &self.allow_list
    }

    /// Persist every aggregate and stage its allow-listed events in one transaction.
    ///
    /// Buffers are cleared only after the commit succeeds. Any error rolls
    /// back both the business rows and the outbox rows and leaves every
    /// buffer as it was.
    pub fn commit(
        &self,
        conn: &mut Connection,
        aggregates: &mut [&mut dyn TrackedAggregate],
    ) -> OutboxResult<CommitSummary> {
        let tx = conn.transaction()?;
        let mut summary = CommitSummary {
            aggregates: aggregates.len(),
            ..CommitSummary::default()
        };

        for aggregate in aggregates.iter() {
            aggregate.persist(&tx)?;

            for event in aggregate.events().pending() {
                let kind = event.kind();
                if !self.allow_list.allows(kind) {
                    debug!(
                        kind,
                        aggregate_id = event.aggregate_id(),
                        "Event not allow-listed, dropping"
                    );
                    summary.dropped += 1;
                    continue;
                }

                let record = NewOutboxRecord {
                    message_id: Uuid::new_v4().to_string(),
                    event_kind: kind.to_string(),
                    aggregate_id: event.aggregate_id().to_string(),
                    payload: event.to_payload()?,
                    created_at: self.clock.now(),
                };
                let id = queries::insert_outbox_record(&tx, &record)?;
                debug!(id, kind, message_id = %record.message_id, "Outbox record staged");
                summary.staged += 1;
            }
        }

        tx.commit()?;

        for aggregate in aggregates.iter_mut() {
            aggregate.events_mut().clear();
        }

        if summary.staged > 0 {
            info!(
                aggregates = summary.aggregates,
                staged = summary.staged,
                dropped = summary.dropped,
                "Unit of work committed"
            );
        }
        Ok(summary)
    }
}
