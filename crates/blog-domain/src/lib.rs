//! Blog content aggregates and the domain events they raise.
//!
//! Aggregates (`Category`, `Post`, `Comment`, `User`) record every state
//! change as a [`DomainEvent`] in their own [`EventBuffer`]. The buffer is
//! transient: the unit of work in `blog-outbox` drains it when the owning
//! transaction commits.
//!
//! ```ignore
//! let mut category = Category::create("Rust", "user-1")?;
//! assert_eq!(category.events().len(), 1);
//! ```

mod aggregates;
mod error;
mod events;

pub use aggregates::{Aggregate, Category, Comment, Post, PostStatus, Role, User};
pub use error::{DomainError, DomainResult};
pub use events::{
    default_allow_listed_kinds, CategoryCreated, CategoryDeleted, CategoryUpdated, CommentAdded,
    CommentDeleted, DomainEvent, EventBuffer, PostCreated, PostDeleted, PostPublished,
    PostUpdated, PostViewed, UserDeleted, UserRegistered, UserRoleChanged, ALL_EVENT_KINDS,
};
