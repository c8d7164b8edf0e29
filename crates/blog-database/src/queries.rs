//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` (a `Transaction` derefs to one) as its
//! first parameter. Timestamps are stored as fixed-width RFC 3339 text with
//! microseconds, so string comparison in SQL matches time order.

use crate::{DatabaseError, DatabaseResult, NewOutboxRecord, OutboxRecord, OutboxStats};
use blog_domain::{Aggregate, Category, Comment, Post, PostStatus, Role, User};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

/// Canonical storage form of a timestamp.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> DatabaseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidData(format!("bad timestamp {s:?}: {e}")))
}

fn column_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn column_opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => column_timestamp(row, idx).map(Some),
    }
}

// ==========================================
// Outbox
// ==========================================

const OUTBOX_COLUMNS: &str = "id, message_id, event_kind, aggregate_id, payload, created_at, \
     processed_at, retry_count, error, next_retry_at, dead_lettered_at, claimed_by, claimed_until";

/// Pending, not dead-lettered, and past any scheduled retry time (`?1` = now).
const DUE_FILTER: &str = "processed_at IS NULL AND dead_lettered_at IS NULL \
     AND (next_retry_at IS NULL OR next_retry_at <= ?1)";

fn map_outbox_row(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    Ok(OutboxRecord {
        id: row.get(0)?,
        message_id: row.get(1)?,
        event_kind: row.get(2)?,
        aggregate_id: row.get(3)?,
        payload: row.get(4)?,
        created_at: column_timestamp(row, 5)?,
        processed_at: column_opt_timestamp(row, 6)?,
        retry_count: row.get(7)?,
        error: row.get(8)?,
        next_retry_at: column_opt_timestamp(row, 9)?,
        dead_lettered_at: column_opt_timestamp(row, 10)?,
        claimed_by: row.get(11)?,
        claimed_until: column_opt_timestamp(row, 12)?,
    })
}

/// Stage a record. Call only with the unit-of-work transaction.
pub fn insert_outbox_record(conn: &Connection, record: &NewOutboxRecord) -> DatabaseResult<i64> {
    conn.execute(
        "INSERT INTO outbox_messages (message_id, event_kind, aggregate_id, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.message_id,
            record.event_kind,
            record.aggregate_id,
            record.payload,
            format_timestamp(record.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get an outbox record by row id.
pub fn get_outbox_record(conn: &Connection, id: i64) -> DatabaseResult<Option<OutboxRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox_messages WHERE id = ?1"
    ))?;
    Ok(stmt.query_row(params![id], map_outbox_row).optional()?)
}

/// All records in insertion order, regardless of state.
pub fn list_outbox_records(conn: &Connection, limit: usize) -> DatabaseResult<Vec<OutboxRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox_messages ORDER BY id ASC LIMIT ?1"
    ))?;
    let records = stmt
        .query_map(params![limit as i64], map_outbox_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Up to `limit` due records, oldest first.
pub fn fetch_due_outbox_records(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> DatabaseResult<Vec<OutboxRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox_messages
         WHERE {DUE_FILTER}
         ORDER BY created_at ASC, id ASC
         LIMIT ?2"
    ))?;
    let records = stmt
        .query_map(params![format_timestamp(now), limit as i64], map_outbox_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Fetch due records not leased by another worker and lease them to `worker_id`.
///
/// Runs in an IMMEDIATE transaction so two dispatchers sharing the file
/// never claim the same row for overlapping leases.
pub fn claim_due_outbox_records(
    conn: &mut Connection,
    worker_id: &str,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    limit: usize,
) -> DatabaseResult<Vec<OutboxRecord>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now_str = format_timestamp(now);
    let lease_str = format_timestamp(lease_until);

    let mut records = {
        let mut stmt = tx.prepare_cached(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_messages
             WHERE {DUE_FILTER}
               AND (claimed_until IS NULL OR claimed_until <= ?1 OR claimed_by = ?3)
             ORDER BY created_at ASC, id ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![now_str, limit as i64, worker_id], map_outbox_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    {
        let mut update = tx.prepare_cached(
            "UPDATE outbox_messages SET claimed_by = ?1, claimed_until = ?2 WHERE id = ?3",
        )?;
        for record in &mut records {
            update.execute(params![worker_id, lease_str, record.id])?;
            record.claimed_by = Some(worker_id.to_string());
            record.claimed_until = Some(lease_until);
        }
    }

    tx.commit()?;
    debug!(worker_id, count = records.len(), "Claimed outbox records");
    Ok(records)
}

/// Push the lease of a record `worker_id` still owns out to `lease_until`.
///
/// Returns false when the record was claimed by another worker since, or is
/// no longer pending. The caller must not publish it then.
pub fn renew_outbox_claim(
    conn: &Connection,
    id: i64,
    worker_id: &str,
    lease_until: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_messages SET claimed_until = ?3
         WHERE id = ?1 AND claimed_by = ?2
           AND processed_at IS NULL AND dead_lettered_at IS NULL",
        params![id, worker_id, format_timestamp(lease_until)],
    )?;
    Ok(changed > 0)
}

/// Set `processed_at` once. Returns false if the record was already
/// delivered, is gone, or is no longer claimed by `worker_id`.
pub fn mark_outbox_delivered(
    conn: &Connection,
    id: i64,
    worker_id: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_messages
         SET processed_at = ?3, error = NULL, next_retry_at = NULL,
             claimed_by = NULL, claimed_until = NULL
         WHERE id = ?1 AND claimed_by = ?2 AND processed_at IS NULL",
        params![id, worker_id, format_timestamp(now)],
    )?;
    Ok(changed > 0)
}

/// Count a failed attempt and schedule the next one.
pub fn mark_outbox_failed(
    conn: &Connection,
    id: i64,
    worker_id: &str,
    error: &str,
    next_retry_at: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_messages
         SET retry_count = retry_count + 1, error = ?3, next_retry_at = ?4,
             claimed_by = NULL, claimed_until = NULL
         WHERE id = ?1 AND claimed_by = ?2 AND processed_at IS NULL",
        params![id, worker_id, error, format_timestamp(next_retry_at)],
    )?;
    Ok(changed > 0)
}

/// Count a failed attempt and take the record out of rotation.
pub fn mark_outbox_dead_lettered(
    conn: &Connection,
    id: i64,
    worker_id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_messages
         SET retry_count = retry_count + 1, error = ?3, dead_lettered_at = ?4,
             next_retry_at = NULL, claimed_by = NULL, claimed_until = NULL
         WHERE id = ?1 AND claimed_by = ?2 AND processed_at IS NULL",
        params![id, worker_id, error, format_timestamp(now)],
    )?;
    Ok(changed > 0)
}

/// Operator reset: make a pending or dead-lettered record due again with a fresh retry budget.
pub fn requeue_outbox_record(conn: &Connection, id: i64) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox_messages
         SET retry_count = 0, error = NULL, next_retry_at = NULL, dead_lettered_at = NULL,
             claimed_by = NULL, claimed_until = NULL
         WHERE id = ?1 AND processed_at IS NULL",
        params![id],
    )?;
    Ok(changed > 0)
}

/// Delete delivered records whose `processed_at` is strictly before `cutoff`.
pub fn purge_delivered_outbox_records(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> DatabaseResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM outbox_messages WHERE processed_at IS NOT NULL AND processed_at < ?1",
        params![format_timestamp(cutoff)],
    )?;
    Ok(deleted)
}

pub fn list_dead_lettered_outbox_records(
    conn: &Connection,
    limit: usize,
) -> DatabaseResult<Vec<OutboxRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox_messages
         WHERE processed_at IS NULL AND dead_lettered_at IS NOT NULL
         ORDER BY created_at ASC, id ASC
         LIMIT ?1"
    ))?;
    let records = stmt
        .query_map(params![limit as i64], map_outbox_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn outbox_stats(conn: &Connection, now: DateTime<Utc>) -> DatabaseResult<OutboxStats> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT
            COALESCE(SUM(CASE WHEN processed_at IS NULL AND dead_lettered_at IS NULL THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN {DUE_FILTER} THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN processed_at IS NULL AND dead_lettered_at IS NULL AND retry_count > 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN processed_at IS NOT NULL THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN processed_at IS NULL AND dead_lettered_at IS NOT NULL THEN 1 ELSE 0 END), 0),
            MIN(CASE WHEN processed_at IS NULL AND dead_lettered_at IS NULL THEN created_at END)
         FROM outbox_messages"
    ))?;
    let stats = stmt.query_row(params![format_timestamp(now)], |row| {
        Ok(OutboxStats {
            pending: row.get::<_, i64>(0)? as u64,
            due: row.get::<_, i64>(1)? as u64,
            retrying: row.get::<_, i64>(2)? as u64,
            delivered: row.get::<_, i64>(3)? as u64,
            dead_lettered: row.get::<_, i64>(4)? as u64,
            oldest_pending_at: column_opt_timestamp(row, 5)?,
        })
    })?;
    Ok(stats)
}

// ==========================================
// Categories
// ==========================================

pub fn save_category(conn: &Connection, category: &Category) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO categories (id, name, slug, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, slug = excluded.slug,
             updated_at = excluded.updated_at",
        params![
            category.id(),
            category.name(),
            category.slug(),
            format_timestamp(Utc::now())
        ],
    )?;
    Ok(())
}

pub fn delete_category(conn: &Connection, id: &str) -> DatabaseResult<()> {
    conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get_category(conn: &Connection, id: &str) -> DatabaseResult<Option<Category>> {
    let mut stmt = conn.prepare_cached("SELECT id, name, slug FROM categories WHERE id = ?1")?;
    Ok(stmt
        .query_row(params![id], |row| {
            Ok(Category::restore(row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .optional()?)
}

// ==========================================
// Posts
// ==========================================

pub fn save_post(conn: &Connection, post: &Post) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO posts (id, title, body, category_id, author_id, status, view_count, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET title = excluded.title, body = excluded.body,
             category_id = excluded.category_id, status = excluded.status,
             view_count = excluded.view_count, updated_at = excluded.updated_at",
        params![
            post.id(),
            post.title(),
            post.body(),
            post.category_id(),
            post.author_id(),
            post.status().as_str(),
            post.view_count(),
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

pub fn delete_post(conn: &Connection, id: &str) -> DatabaseResult<()> {
    conn.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
    conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get_post(conn: &Connection, id: &str) -> DatabaseResult<Option<Post>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, title, body, category_id, author_id, status, view_count
         FROM posts WHERE id = ?1",
    )?;
    let row = stmt
        .query_row(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .optional()?;

    row.map(|(id, title, body, category_id, author_id, status, views)| -> DatabaseResult<Post> {
        let status = PostStatus::from_str(&status)
            .ok_or_else(|| DatabaseError::InvalidData(format!("unknown post status: {status}")))?;
        Ok(Post::restore(id, title, body, category_id, author_id, status, views))
    })
    .transpose()
}

// ==========================================
// Comments
// ==========================================

pub fn save_comment(conn: &Connection, comment: &Comment) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO comments (id, post_id, author_id, body, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![
            comment.id(),
            comment.post_id(),
            comment.author_id(),
            comment.body(),
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

pub fn delete_comment(conn: &Connection, id: &str) -> DatabaseResult<()> {
    conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get_comment(conn: &Connection, id: &str) -> DatabaseResult<Option<Comment>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, post_id, author_id, body FROM comments WHERE id = ?1")?;
    Ok(stmt
        .query_row(params![id], |row| {
            Ok(Comment::restore(row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .optional()?)
}

// ==========================================
// Users
// ==========================================

pub fn save_user(conn: &Connection, user: &User) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO users (id, username, email, role, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET username = excluded.username, email = excluded.email,
             role = excluded.role, updated_at = excluded.updated_at",
        params![
            user.id(),
            user.username(),
            user.email(),
            user.role().as_str(),
            format_timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

pub fn delete_user(conn: &Connection, id: &str) -> DatabaseResult<()> {
    conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> DatabaseResult<Option<User>> {
    let mut stmt =
        conn.prepare_cached("SELECT id, username, email, role FROM users WHERE id = ?1")?;
    let row = stmt
        .query_row(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()?;

    row.map(|(id, username, email, role)| -> DatabaseResult<User> {
        let role = Role::parse(&role).map_err(|e| DatabaseError::InvalidData(e.to_string()))?;
        Ok(User::restore(id, username, email, role))
    })
    .transpose()
}
