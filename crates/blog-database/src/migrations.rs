//! Database migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_content_schema(conn)?;
    }
    if current_version < 2 {
        migrate_v2_outbox(conn)?;
    }
    if current_version < 3 {
        migrate_v3_outbox_claims(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: categories, posts, comments, users.
fn migrate_v1_content_schema(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: content schema");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            category_id TEXT,
            author_id TEXT NOT NULL,
            status TEXT NOT NULL,
            view_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY NOT NULL,
            post_id TEXT NOT NULL,
            author_id TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_category ON posts(category_id);
        CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
        ",
    )?;

    record_migration(conn, 1, "content_schema")?;
    Ok(())
}

/// V2: transactional outbox.
fn migrate_v2_outbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: outbox");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS outbox_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT NOT NULL UNIQUE,
            event_kind TEXT NOT NULL,
            aggregate_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            processed_at TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            next_retry_at TEXT,
            dead_lettered_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_due
            ON outbox_messages(processed_at, dead_lettered_at, next_retry_at, created_at);
        CREATE INDEX IF NOT EXISTS idx_outbox_processed ON outbox_messages(processed_at);
        ",
    )?;

    record_migration(conn, 2, "outbox")?;
    Ok(())
}

/// V3: claim lease columns so several dispatchers can share one table.
fn migrate_v3_outbox_claims(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v3: outbox claims");

    conn.execute_batch(
        "
        ALTER TABLE outbox_messages ADD COLUMN claimed_by TEXT;
        ALTER TABLE outbox_messages ADD COLUMN claimed_until TEXT;
        ",
    )?;

    record_migration(conn, 3, "outbox_claims")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_to_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);

        let mut stmt = conn.prepare("PRAGMA table_info(outbox_messages)").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for expected in ["message_id", "next_retry_at", "dead_lettered_at", "claimed_until"] {
            assert!(columns.iter().any(|c| c == expected), "missing {expected}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, CURRENT_VERSION as i64);
    }
}
