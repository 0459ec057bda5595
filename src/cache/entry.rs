//! Cache entry shared by both client tiers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cached payload and the instant it was fetched.
///
/// Serialized as `{"payload": ..., "createdAt": <unix millis>}` on the
/// durable surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Opaque JSON payload returned by the API
    pub payload: Value,
    /// When the payload was received
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Wrap a freshly received payload
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self::at(payload, Utc::now())
    }

    /// Wrap a payload with an explicit creation time
    #[must_use]
    pub fn at(payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            created_at,
        }
    }

    /// Age of the entry at `now`. Entries stamped in the future are age zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Stale once `now - created_at >= ttl`
    #[must_use]
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) >= ttl
    }

    /// [`Self::is_expired_at`] against the current wall clock
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.is_expired_at(ttl, Utc::now())
    }
}
