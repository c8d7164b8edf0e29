//! Event converter registry.
//!
//! Maps an outbox record's `event_kind` to a converter that deserializes the
//! payload into its event struct and shapes it into an
//! [`ActivityNotification`]. Supporting a new kind means registering one
//! more converter; nothing else changes.

use crate::ActivityNotification;
use blog_database::OutboxRecord;
use blog_domain::*;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

/// Conversion failures. Both are permanent for the record concerned.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("No converter registered for event kind {0}")]
    UnknownKind(String),

    #[error("Payload for {kind} does not match its shape: {source}")]
    Deserialization {
        kind: String,
        source: serde_json::Error,
    },
}

/// Turns one stored record into a notification.
pub trait EventConverter: Send + Sync {
    fn convert(&self, record: &OutboxRecord) -> Result<ActivityNotification, ConversionError>;
}

/// Maps a deserialized event (plus its record, for ids) to a notification.
pub type MapFn<E> = fn(E, &OutboxRecord) -> ActivityNotification;

/// Converter for JSON payloads of type `E`.
pub struct JsonConverter<E> {
    map: MapFn<E>,
}

impl<E> JsonConverter<E> {
    pub fn new(map: MapFn<E>) -> Self {
        Self { map }
    }
}

impl<E: DeserializeOwned> EventConverter for JsonConverter<E> {
    fn convert(&self, record: &OutboxRecord) -> Result<ActivityNotification, ConversionError> {
        let event: E = serde_json::from_str(&record.payload).map_err(|source| {
            ConversionError::Deserialization {
                kind: record.event_kind.clone(),
                source,
            }
        })?;
        Ok((self.map)(event, record))
    }
}

/// Strategy table keyed by event kind.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Box<dyn EventConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a converter for every blog event kind.
    pub fn with_blog_events() -> Self {
        let mut registry = Self::new();
        registry.register_json::<CategoryCreated>("CategoryCreated", category_created);
        registry.register_json::<CategoryUpdated>("CategoryUpdated", category_updated);
        registry.register_json::<CategoryDeleted>("CategoryDeleted", category_deleted);
        registry.register_json::<PostCreated>("PostCreated", post_created);
        registry.register_json::<PostUpdated>("PostUpdated", post_updated);
        registry.register_json::<PostPublished>("PostPublished", post_published);
        registry.register_json::<PostDeleted>("PostDeleted", post_deleted);
        registry.register_json::<PostViewed>("PostViewed", post_viewed);
        registry.register_json::<CommentAdded>("CommentAdded", comment_added);
        registry.register_json::<CommentDeleted>("CommentDeleted", comment_deleted);
        registry.register_json::<UserRegistered>("UserRegistered", user_registered);
        registry.register_json::<UserRoleChanged>("UserRoleChanged", user_role_changed);
        registry.register_json::<UserDeleted>("UserDeleted", user_deleted);
        registry
    }

    /// Register a converter, returning the one it replaced.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        converter: Box<dyn EventConverter>,
    ) -> Option<Box<dyn EventConverter>> {
        self.converters.insert(kind.into(), converter)
    }

    pub fn register_json<E: DeserializeOwned + 'static>(&mut self, kind: &str, map: MapFn<E>) {
        self.register(kind, Box::new(JsonConverter::new(map)));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.converters.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn convert(&self, record: &OutboxRecord) -> Result<ActivityNotification, ConversionError> {
        self.converters
            .get(&record.event_kind)
            .ok_or_else(|| ConversionError::UnknownKind(record.event_kind.clone()))?
            .convert(record)
    }
}

fn activity(
    record: &OutboxRecord,
    activity_type: &str,
    entity_type: &str,
    entity_id: &str,
    title: String,
) -> ActivityNotification {
    ActivityNotification {
        notification_id: record.message_id.clone(),
        activity_type: activity_type.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        title,
        details: None,
        actor_id: None,
        occurred_at: record.created_at,
    }
}

fn category_created(e: CategoryCreated, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: Some(json!({ "slug": e.slug })),
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "category.created",
            "category",
            &e.category_id,
            format!("Category \"{}\" created", e.name),
        )
    }
}

fn category_updated(e: CategoryUpdated, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: Some(json!({ "previousName": e.previous_name })),
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "category.updated",
            "category",
            &e.category_id,
            format!("Category \"{}\" updated", e.name),
        )
    }
}

fn category_deleted(e: CategoryDeleted, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "category.deleted",
            "category",
            &e.category_id,
            format!("Category \"{}\" deleted", e.name),
        )
    }
}

fn post_created(e: PostCreated, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: e.category_id.map(|id| json!({ "categoryId": id })),
        actor_id: Some(e.author_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "post.created",
            "post",
            &e.post_id,
            format!("Post \"{}\" created", e.title),
        )
    }
}

fn post_updated(e: PostUpdated, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "post.updated",
            "post",
            &e.post_id,
            format!("Post \"{}\" updated", e.title),
        )
    }
}

fn post_published(e: PostPublished, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "post.published",
            "post",
            &e.post_id,
            format!("Post \"{}\" published", e.title),
        )
    }
}

fn post_deleted(e: PostDeleted, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "post.deleted",
            "post",
            &e.post_id,
            format!("Post \"{}\" deleted", e.title),
        )
    }
}

fn post_viewed(e: PostViewed, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: e.viewer_id,
        occurred_at: e.occurred_at,
        ..activity(record, "post.viewed", "post", &e.post_id, "Post viewed".to_string())
    }
}

fn comment_added(e: CommentAdded, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: Some(json!({ "postId": e.post_id, "excerpt": e.excerpt })),
        actor_id: Some(e.author_id),
        occurred_at: e.occurred_at,
        ..activity(record, "comment.added", "comment", &e.comment_id, "Comment added".to_string())
    }
}

fn comment_deleted(e: CommentDeleted, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: Some(json!({ "postId": e.post_id })),
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "comment.deleted",
            "comment",
            &e.comment_id,
            "Comment deleted".to_string(),
        )
    }
}

fn user_registered(e: UserRegistered, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.user_id.clone()),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "user.registered",
            "user",
            &e.user_id,
            format!("User {} registered", e.username),
        )
    }
}

fn user_role_changed(e: UserRoleChanged, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        details: Some(json!({ "previousRole": e.previous_role, "newRole": e.new_role })),
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "user.role_changed",
            "user",
            &e.user_id,
            format!("User {} is now {}", e.username, e.new_role),
        )
    }
}

fn user_deleted(e: UserDeleted, record: &OutboxRecord) -> ActivityNotification {
    ActivityNotification {
        actor_id: Some(e.actor_id),
        occurred_at: e.occurred_at,
        ..activity(
            record,
            "user.deleted",
            "user",
            &e.user_id,
            format!("User {} deleted", e.username),
        )
    }
}
