//! Sample content written through the unit of work, for trying the relay locally.

use blog_config_and_utils::{Config, Paths};
use blog_database::Database;
use blog_domain::{Aggregate, Category, Comment, Post, Role, User};
use blog_outbox::{CommitSummary, EventAllowList, SystemClock, UnitOfWork};
use std::sync::Arc;
use tracing::info;

pub(crate) fn seed_into(
    db: &mut Database,
    allow_list: EventAllowList,
) -> Result<CommitSummary, Box<dyn std::error::Error>> {
    let uow = UnitOfWork::new(allow_list, Arc::new(SystemClock));

    let mut admin = User::register("admin", "admin@blog.example")?;
    let admin_id = admin.id().to_string();
    admin.change_role(Role::Admin, &admin_id)?;
    let mut author = User::register("writer", "writer@blog.example")?;
    author.change_role(Role::Author, &admin_id)?;

    let mut category = Category::create("Announcements", &admin_id)?;
    let mut post = Post::create(
        "Hello, outbox",
        "Every change here becomes an activity notification.",
        Some(category.id()),
        author.id(),
    )?;
    post.publish(author.id())?;
    post.record_view(None)?;
    let mut comment = Comment::add(post.id(), &admin_id, "Welcome aboard!")?;

    let summary = uow.commit(
        db.connection_mut(),
        &mut [&mut admin, &mut author, &mut category, &mut post, &mut comment],
    )?;
    Ok(summary)
}

pub fn seed_content(config: &Config, paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    paths.ensure_dirs()?;
    let mut db = Database::open(&paths.database_file())?;
    let summary = seed_into(&mut db, EventAllowList::from(&config.outbox))?;
    info!(staged = summary.staged, dropped = summary.dropped, "Seed content committed");
    println!(
        "Committed {} aggregates, staged {} outbox records ({} events not allow-listed)",
        summary.aggregates, summary.staged, summary.dropped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blog_database::queries;

    #[test]
    fn seed_stages_allow_listed_events() {
        let mut db = Database::open_in_memory().unwrap();
        let summary = seed_into(&mut db, EventAllowList::default()).unwrap();

        assert_eq!(summary.aggregates, 5);
        // Two registrations, two role changes, category, post created and published, comment.
        assert_eq!(summary.staged, 8);
        assert_eq!(summary.dropped, 1);
        assert_eq!(queries::list_outbox_records(db.connection(), 100).unwrap().len(), 8);
    }
}
