//! Row persistence for aggregates.

use crate::{queries, DatabaseResult};
use blog_domain::{Aggregate, Category, Comment, Post, User};
use rusqlite::Connection;

/// Write an aggregate's current state: upsert, or delete once it was deleted.
pub trait Persist {
    fn persist(&self, conn: &Connection) -> DatabaseResult<()>;
}

impl Persist for Category {
    fn persist(&self, conn: &Connection) -> DatabaseResult<()> {
        if self.is_deleted() {
            queries::delete_category(conn, self.id())
        } else {
            queries::save_category(conn, self)
        }
    }
}

impl Persist for Post {
    fn persist(&self, conn: &Connection) -> DatabaseResult<()> {
        if self.is_deleted() {
            queries::delete_post(conn, self.id())
        } else {
            queries::save_post(conn, self)
        }
    }
}

impl Persist for Comment {
    fn persist(&self, conn: &Connection) -> DatabaseResult<()> {
        if self.is_deleted() {
            queries::delete_comment(conn, self.id())
        } else {
            queries::save_comment(conn, self)
        }
    }
}

impl Persist for User {
    fn persist(&self, conn: &Connection) -> DatabaseResult<()> {
        if self.is_deleted() {
            queries::delete_user(conn, self.id())
        } else {
            queries::save_user(conn, self)
        }
    }
}
