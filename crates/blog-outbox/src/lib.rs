//! Transactional outbox for blog activity notifications.
//!
//! This crate provides:
//! - `UnitOfWork`: persists aggregates and stages their allow-listed events
//!   as outbox records in the same SQLite transaction
//! - `ConverterRegistry`: per-kind converters from stored records to
//!   `ActivityNotification`s
//! - `OutboxDispatcher`: background loop that claims due records, publishes
//!   them through a `Broker`, and schedules retries with exponential backoff
//! - `RetentionSweeper`: purges delivered records past the retention window
//!
//! Delivery is at-least-once. Every publish of a record carries the same
//! `notification_id`, so consumers deduplicate on it.

mod allow_list;
mod backoff;
mod broker;
mod clock;
mod converter;
mod dispatcher;
mod error;
mod notification;
mod store;
mod sweeper;
mod unit_of_work;

pub use allow_list::EventAllowList;
pub use backoff::{RetryDecision, RetryPolicy};
pub use broker::{Broker, BrokerError, HttpBroker, HttpBrokerConfig, LogBroker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use converter::{ConversionError, ConverterRegistry, EventConverter, JsonConverter, MapFn};
pub use dispatcher::{CycleReport, DispatcherConfig, DispatcherHandle, OutboxDispatcher};
pub use error::{OutboxError, OutboxResult};
pub use notification::ActivityNotification;
pub use store::OutboxStore;
pub use sweeper::RetentionSweeper;
pub use unit_of_work::{CommitSummary, TrackedAggregate, UnitOfWork};

#[cfg(test)]
mod tests;
