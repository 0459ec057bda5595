//! In-memory cache tier with lazy TTL eviction.

use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::entry::CacheEntry;
use super::key::CacheKey;

/// Process-local cache tier.
///
/// A single TTL applies to every entry. Staleness is only detected on
/// [`get`](Self::get), which deletes the stale entry so it is reported at
/// most once.
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl MemoryCache {
    /// Create an empty cache with the given TTL
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// TTL applied at read time
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a fresh entry, evicting it instead if it has gone stale
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(self.ttl) {
            // Release the shard guard before mutating; a concurrent fresh
            // write must survive
            drop(entry);
            if self
                .entries
                .remove_if(key, |_, e| e.is_expired(self.ttl))
                .is_some()
            {
                debug!(key = %key, "Evicted stale memory entry");
            }
            return None;
        }
        Some(entry.value().clone())
    }

    /// Insert or replace an entry
    pub fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Remove an entry
    pub fn delete(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, stale ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use serde_json::json;

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, &json!({}))
    }

    #[test]
    fn get_returns_fresh_entry() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        let entry = CacheEntry::new(json!({"dep": "75"}));
        cache.set(key("/a"), entry.clone());

        assert_eq!(cache.get(&key("/a")), Some(entry));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_deletes_stale_entry() {
        // GIVEN: an entry older than the TTL
        // WHEN: reading it
        // THEN: miss, and the entry is gone
        let cache = MemoryCache::new(Duration::from_secs(60));
        let old = CacheEntry::at(json!(1), Utc::now() - TimeDelta::seconds(61));
        cache.set(key("/old"), old);

        assert_eq!(cache.get(&key("/old")), None);
        assert!(cache.is_empty(), "stale entry must be removed on read");
    }

    #[test]
    fn stale_read_racing_a_fresh_write_keeps_the_fresh_entry() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        let stale = || CacheEntry::at(json!("old"), Utc::now() - TimeDelta::seconds(61));

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                for _ in 0..2_000 {
                    cache.get(&key("/race"));
                }
            });
            for _ in 0..2_000 {
                cache.set(key("/race"), stale());
                cache.set(key("/race"), CacheEntry::new(json!("fresh")));
                assert_eq!(
                    cache.get(&key("/race")).map(|e| e.payload),
                    Some(json!("fresh"))
                );
            }
            reader.join().expect("reader");
        });
    }

    #[test]
    fn set_replaces_existing_entry() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set(key("/a"), CacheEntry::new(json!(1)));
        cache.set(key("/a"), CacheEntry::new(json!(2)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("/a")).map(|e| e.payload), Some(json!(2)));
    }

    #[test]
    fn delete_and_clear() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.set(key("/a"), CacheEntry::new(json!(1)));
        cache.set(key("/b"), CacheEntry::new(json!(2)));

        cache.delete(&key("/a"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("/a")), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
