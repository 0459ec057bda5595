//! Server preload cache
//!
//! Thread-safe TTL cache in front of the [`DataSource`](super::DataSource).
//! Warmed at startup, consulted by every read route. Keys are
//! `{kind}:{entity}`, e.g. `crime_history:dept:75`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use super::source::{DataKind, Entity};

/// A cached value with TTL metadata
struct Preloaded {
    value: Value,
    cached_at: Instant,
    ttl: Duration,
}

impl Preloaded {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Counters tracked atomically
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    #[allow(clippy::cast_precision_loss)]
    fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Preload cache with per-entry TTL
pub struct PreloadCache {
    entries: DashMap<String, Preloaded>,
    default_ttl: Duration,
    counters: Counters,
}

impl PreloadCache {
    /// Create an empty cache; `set` without a TTL uses `default_ttl`
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            counters: Counters::default(),
        }
    }

    /// Key of one dataset family for one entity
    #[must_use]
    pub fn key(entity: &Entity, kind: DataKind) -> String {
        format!("{kind}:{entity}")
    }

    /// Cached value, unless missing or expired. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let Some(entry) = self.entries.get(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            None
        } else {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value.clone())
        }
    }

    /// Store `value` under `key`
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        self.entries.insert(
            key.into(),
            Preloaded {
                value,
                cached_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    /// Whether a fresh entry exists; does not touch the counters
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Remove one entry
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current statistics
    pub fn stats(&self) -> PreloadStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        PreloadStats {
            hits,
            misses,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            hit_rate: Counters::hit_rate(hits, misses),
        }
    }
}

/// Snapshot of preload cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct PreloadStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that found nothing fresh
    pub misses: u64,
    /// Expired entries removed on read
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
