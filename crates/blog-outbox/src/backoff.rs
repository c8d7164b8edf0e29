//! Retry scheduling for failed publishes.
//!
//! After the n-th failure (n = `retry_count` before the attempt, 0-based)
//! the next attempt is scheduled `base_delay * 2^n` later: 1, 2, 4, 8, 16
//! minutes with the default base and five retries. A failure on a record
//! whose `retry_count` has already reached `max_attempts` exhausts it.

use chrono::{DateTime, Duration, Utc};

/// Largest exponent applied; beyond it the delay no longer changes.
const MAX_SHIFT: u32 = 20;

/// 9999-12-31T23:59:59Z. Later instants no longer format as four-digit
/// years and would sort before every stored timestamp.
const LATEST_RETRY_SECS: i64 = 253_402_300_799;

fn latest_retry_at() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(LATEST_RETRY_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// What to do with a record after a failed publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(DateTime<Utc>),
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RetryPolicy {
    /// Exponential policy with a one minute base.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::minutes(1),
            max_attempts,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `base_delay * 2^retry_count`, saturating.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.num_milliseconds().max(0) as u64;
        let multiplier = 1u64
            .checked_shl(retry_count.min(MAX_SHIFT))
            .unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(multiplier).min(i64::MAX as u64);
        Duration::milliseconds(delay_ms as i64)
    }

    /// `now + delay_for(retry_count)`, never later than the end of year 9999.
    pub fn next_retry_at(&self, retry_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let latest = latest_retry_at();
        now.checked_add_signed(self.delay_for(retry_count))
            .map_or(latest, |at| at.min(latest))
    }

    /// True once `retry_count` scheduled retries have been used up.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }

    /// Decide the fate of a record whose publish just failed.
    pub fn decide(&self, retry_count: u32, now: DateTime<Utc>) -> RetryDecision {
        if self.is_exhausted(retry_count) {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAt(self.next_retry_at(retry_count, now))
        }
    }
}
