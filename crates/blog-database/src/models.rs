//! Row models for the outbox table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an outbox record, derived from its timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting for a (first or further) publish attempt.
    Pending,
    /// Acknowledged by the broker; eligible for retention purge.
    Delivered,
    /// Permanently failed or exhausted; kept for an operator.
    DeadLettered,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// A durable notification intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: i64,
    /// Stable id carried by every publish of this record.
    pub message_id: String,
    pub event_kind: String,
    pub aggregate_id: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub claimed_until: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn status(&self) -> OutboxStatus {
        if self.processed_at.is_some() {
            OutboxStatus::Delivered
        } else if self.dead_lettered_at.is_some() {
            OutboxStatus::DeadLettered
        } else {
            OutboxStatus::Pending
        }
    }

    /// Whether the dispatcher may pick this record up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status() == OutboxStatus::Pending
            && self.next_retry_at.map_or(true, |at| at <= now)
    }
}

/// Input for staging a record inside a unit-of-work transaction.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub message_id: String,
    pub event_kind: String,
    pub aggregate_id: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Counts by lifecycle state, for operators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: u64,
    /// Pending and eligible right now.
    pub due: u64,
    /// Pending with at least one failed attempt.
    pub retrying: u64,
    pub delivered: u64,
    pub dead_lettered: u64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> OutboxRecord {
        OutboxRecord {
            id: 1,
            message_id: "m-1".to_string(),
            event_kind: "CategoryCreated".to_string(),
            aggregate_id: "cat-1".to_string(),
            payload: "{}".to_string(),
            created_at: Utc::now(),
            processed_at: None,
            retry_count: 0,
            error: None,
            next_retry_at: None,
            dead_lettered_at: None,
            claimed_by: None,
            claimed_until: None,
        }
    }

    #[test]
    fn status_prefers_delivered() {
        let mut r = record();
        assert_eq!(r.status(), OutboxStatus::Pending);

        r.dead_lettered_at = Some(Utc::now());
        assert_eq!(r.status(), OutboxStatus::DeadLettered);

        r.processed_at = Some(Utc::now());
        assert_eq!(r.status(), OutboxStatus::Delivered);
    }

    #[test]
    fn is_due_respects_next_retry_at() {
        let now = Utc::now();
        let mut r = record();
        assert!(r.is_due(now));

        r.next_retry_at = Some(now + Duration::minutes(1));
        assert!(!r.is_due(now));
        assert!(r.is_due(now + Duration::minutes(1)));
    }

    #[test]
    fn status_as_str() {
        assert_eq!(OutboxStatus::Pending.as_str(), "pending");
        assert_eq!(OutboxStatus::Delivered.as_str(), "delivered");
        assert_eq!(OutboxStatus::DeadLettered.as_str(), "dead_lettered");
    }
}
