//! Domain events and the per-aggregate event buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event kind the blog domain can raise, in declaration order.
pub const ALL_EVENT_KINDS: &[&str] = &[
    "CategoryCreated",
    "CategoryUpdated",
    "CategoryDeleted",
    "PostCreated",
    "PostUpdated",
    "PostPublished",
    "PostDeleted",
    "PostViewed",
    "CommentAdded",
    "CommentDeleted",
    "UserRegistered",
    "UserRoleChanged",
    "UserDeleted",
];

/// Kinds captured by the outbox unless configuration says otherwise.
///
/// `PostViewed` is raised on every read and is left out.
pub fn default_allow_listed_kinds() -> Vec<String> {
    ALL_EVENT_KINDS
        .iter()
        .filter(|kind| **kind != "PostViewed")
        .map(|kind| kind.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCreated {
    pub category_id: String,
    pub name: String,
    pub slug: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryUpdated {
    pub category_id: String,
    pub name: String,
    pub previous_name: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDeleted {
    pub category_id: String,
    pub name: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostCreated {
    pub post_id: String,
    pub title: String,
    pub category_id: Option<String>,
    pub author_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostUpdated {
    pub post_id: String,
    pub title: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPublished {
    pub post_id: String,
    pub title: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDeleted {
    pub post_id: String,
    pub title: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostViewed {
    pub post_id: String,
    pub viewer_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAdded {
    pub comment_id: String,
    pub post_id: String,
    pub author_id: String,
    /// First characters of the comment body.
    pub excerpt: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentDeleted {
    pub comment_id: String,
    pub post_id: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: String,
    pub username: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleChanged {
    pub user_id: String,
    pub username: String,
    pub previous_role: String,
    pub new_role: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDeleted {
    pub user_id: String,
    pub username: String,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Something that happened to an aggregate during a unit of work.
///
/// The variant name is the event kind. Only the inner struct is serialized,
/// so a stored payload can be read back knowing the kind alone.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    CategoryCreated(CategoryCreated),
    CategoryUpdated(CategoryUpdated),
    CategoryDeleted(CategoryDeleted),
    PostCreated(PostCreated),
    PostUpdated(PostUpdated),
    PostPublished(PostPublished),
    PostDeleted(PostDeleted),
    PostViewed(PostViewed),
    CommentAdded(CommentAdded),
    CommentDeleted(CommentDeleted),
    UserRegistered(UserRegistered),
    UserRoleChanged(UserRoleChanged),
    UserDeleted(UserDeleted),
}

impl DomainEvent {
    /// The string tag stored alongside the payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CategoryCreated(_) => "CategoryCreated",
            Self::CategoryUpdated(_) => "CategoryUpdated",
            Self::CategoryDeleted(_) => "CategoryDeleted",
            Self::PostCreated(_) => "PostCreated",
            Self::PostUpdated(_) => "PostUpdated",
            Self::PostPublished(_) => "PostPublished",
            Self::PostDeleted(_) => "PostDeleted",
            Self::PostViewed(_) => "PostViewed",
            Self::CommentAdded(_) => "CommentAdded",
            Self::CommentDeleted(_) => "CommentDeleted",
            Self::UserRegistered(_) => "UserRegistered",
            Self::UserRoleChanged(_) => "UserRoleChanged",
            Self::UserDeleted(_) => "UserDeleted",
        }
    }

    /// Id of the entity the event is about.
    pub fn aggregate_id(&self) -> &str {
        match self {
            Self::CategoryCreated(e) => &e.category_id,
            Self::CategoryUpdated(e) => &e.category_id,
            Self::CategoryDeleted(e) => &e.category_id,
            Self::PostCreated(e) => &e.post_id,
            Self::PostUpdated(e) => &e.post_id,
            Self::PostPublished(e) => &e.post_id,
            Self::PostDeleted(e) => &e.post_id,
            Self::PostViewed(e) => &e.post_id,
            Self::CommentAdded(e) => &e.comment_id,
            Self::CommentDeleted(e) => &e.comment_id,
            Self::UserRegistered(e) => &e.user_id,
            Self::UserRoleChanged(e) => &e.user_id,
            Self::UserDeleted(e) => &e.user_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::CategoryCreated(e) => e.occurred_at,
            Self::CategoryUpdated(e) => e.occurred_at,
            Self::CategoryDeleted(e) => e.occurred_at,
            Self::PostCreated(e) => e.occurred_at,
            Self::PostUpdated(e) => e.occurred_at,
            Self::PostPublished(e) => e.occurred_at,
            Self::PostDeleted(e) => e.occurred_at,
            Self::PostViewed(e) => e.occurred_at,
            Self::CommentAdded(e) => e.occurred_at,
            Self::CommentDeleted(e) => e.occurred_at,
            Self::UserRegistered(e) => e.occurred_at,
            Self::UserRoleChanged(e) => e.occurred_at,
            Self::UserDeleted(e) => e.occurred_at,
        }
    }

    /// Serialize the variant's payload struct to JSON.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        match self {
            Self::CategoryCreated(e) => serde_json::to_string(e),
            Self::CategoryUpdated(e) => serde_json::to_string(e),
            Self::CategoryDeleted(e) => serde_json::to_string(e),
            Self::PostCreated(e) => serde_json::to_string(e),
            Self::PostUpdated(e) => serde_json::to_string(e),
            Self::PostPublished(e) => serde_json::to_string(e),
            Self::PostDeleted(e) => serde_json::to_string(e),
            Self::PostViewed(e) => serde_json::to_string(e),
            Self::CommentAdded(e) => serde_json::to_string(e),
            Self::CommentDeleted(e) => serde_json::to_string(e),
            Self::UserRegistered(e) => serde_json::to_string(e),
            Self::UserRoleChanged(e) => serde_json::to_string(e),
            Self::UserDeleted(e) => serde_json::to_string(e),
        }
    }
}

/// Events raised by one aggregate and not yet committed.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<DomainEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&mut self, event: DomainEvent) {
        self.events.push(event);
    }

    /// Events in the order they were raised.
    pub fn pending(&self) -> &[DomainEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Forget every pending event. Called once the owning transaction commits.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
