//! SQLite storage for blog content and the transactional outbox.
//!
//! This crate provides:
//! - A synchronous `Database` handle used by the unit of work
//! - An async executor (`AsyncDatabase`) with a dedicated SQLite thread
//! - Schema migrations
//! - Row models for the `outbox_messages` table
//! - Query helpers for content rows and outbox records
//!
//! # Architecture
//!
//! Business writes and outbox inserts share one `rusqlite` transaction.
//! Dispatcher-side updates go through `AsyncDatabase::call`, each one its
//! own small statement or transaction:
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let due = db.call(move |conn| queries::fetch_due_outbox_records(conn, now, 50)).await?;
//! ```
//!
//! Only SQL should run inside `call()`; network calls happen outside.

mod db;
mod error;
mod executor;
mod migrations;
mod models;
mod persist;
pub mod queries;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::{NewOutboxRecord, OutboxRecord, OutboxStats, OutboxStatus};
pub use persist::Persist;
pub use queries::{format_timestamp, parse_timestamp};
