//! Outbound "activity record created" notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical shape published to the broker.
///
/// `notification_id` is the outbox record's `message_id`, so a redelivery
/// after a crash carries the same id and consumers can drop the duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityNotification {
    pub notification_id: String,
    /// Dotted tag, e.g. `category.created`.
    pub activity_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
