//! Durable cache tier
//!
//! Best-effort persistent cache on top of a [`DurableSurface`]. Nothing here
//! returns an error: unreadable entries are misses, and a write that hits the
//! quota triggers eviction and is then dropped.

use std::sync::Arc;

use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::surface::{DurableSurface, SurfaceError};

/// Namespace prefix for durable cache keys
pub const DEFAULT_PREFIX: &str = "api_cache";

/// Result of a durable write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The entry was persisted
    Stored,
    /// The quota was hit; this many keys were evicted and the write dropped
    Evicted(usize),
    /// The write failed for another reason and was dropped
    Dropped,
}

/// Durable cache tier.
///
/// Keys are stored as `<prefix>_<cacheKey>` so the cache can be cleared by
/// prefix without touching other data on the same surface.
pub struct DurableCache {
    surface: Arc<dyn DurableSurface>,
    prefix: String,
}

impl DurableCache {
    /// Wrap `surface` using [`DEFAULT_PREFIX`]
    #[must_use]
    pub fn new(surface: Arc<dyn DurableSurface>) -> Self {
        Self::with_prefix(surface, DEFAULT_PREFIX)
    }

    /// Wrap `surface` with a custom namespace prefix
    #[must_use]
    pub fn with_prefix(surface: Arc<dyn DurableSurface>, prefix: impl Into<String>) -> Self {
        Self {
            surface,
            prefix: prefix.into(),
        }
    }

    /// The underlying surface
    #[must_use]
    pub fn surface(&self) -> &Arc<dyn DurableSurface> {
        &self.surface
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}_{key}", self.prefix)
    }

    fn owns(&self, storage_key: &str) -> bool {
        storage_key
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }

    fn owned_keys(&self) -> Vec<String> {
        self.surface
            .keys()
            .into_iter()
            .filter(|k| self.owns(k))
            .collect()
    }

    /// Read an entry. Unparseable data is a miss and is removed.
    ///
    /// TTL is not checked here; the caller decides what stale means.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage_key = self.storage_key(key);
        let raw = self.surface.get_item(&storage_key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key = %key, error = %e, "Discarding unreadable durable entry");
                self.surface.remove_item(&storage_key);
                None
            }
        }
    }

    /// Persist an entry, evicting under quota pressure instead of failing
    pub fn set(&self, key: &CacheKey, entry: &CacheEntry) -> WriteOutcome {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize durable entry");
                return WriteOutcome::Dropped;
            }
        };

        match self.surface.set_item(&self.storage_key(key), &raw) {
            Ok(()) => WriteOutcome::Stored,
            Err(SurfaceError::QuotaExceeded { needed, available }) => {
                let evicted = self.evict();
                warn!(
                    key = %key,
                    needed,
                    available,
                    evicted,
                    "Durable cache quota exceeded, evicted entries and dropped write"
                );
                WriteOutcome::Evicted(evicted)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Durable cache write failed");
                WriteOutcome::Dropped
            }
        }
    }

    /// Remove an entry
    pub fn remove(&self, key: &CacheKey) {
        self.surface.remove_item(&self.storage_key(key));
    }

    /// Evict roughly a quarter of the cache keys.
    ///
    /// Victims are the first keys in the surface's enumeration order, which
    /// approximates but does not track recency. Returns how many were removed.
    pub fn evict(&self) -> usize {
        let keys = self.owned_keys();
        let count = keys.len().div_ceil(4);
        for key in keys.iter().take(count) {
            self.surface.remove_item(key);
        }
        count
    }

    /// Remove every cache key, leaving other data on the surface untouched
    pub fn clear(&self) -> usize {
        let keys = self.owned_keys();
        for key in &keys {
            self.surface.remove_item(key);
        }
        keys.len()
    }

    /// Number of cache keys on the surface
    #[must_use]
    pub fn len(&self) -> usize {
        self.owned_keys().len()
    }

    /// Return `true` when no cache keys are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySurface;
    use serde_json::json;

    fn key(n: usize) -> CacheKey {
        CacheKey::derive(&format!("/rankings?page={n}"), &json!({}))
    }

    fn durable(quota: usize) -> (Arc<MemorySurface>, DurableCache) {
        let surface = Arc::new(MemorySurface::new(quota));
        let cache = DurableCache::new(surface.clone());
        (surface, cache)
    }

    #[test]
    fn set_then_get_returns_a_copy() {
        let (_surface, cache) = durable(64 * 1024);
        let entry = CacheEntry::new(json!({"rank": 1}));

        assert_eq!(cache.set(&key(1), &entry), WriteOutcome::Stored);
        assert_eq!(cache.get(&key(1)), Some(entry));
    }

    #[test]
    fn keys_are_namespaced() {
        let (surface, cache) = durable(64 * 1024);
        cache.set(&key(1), &CacheEntry::new(json!(1)));

        let keys = surface.keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0], format!("api_cache_{}", key(1)));
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        // GIVEN: garbage stored under a cache key
        // WHEN: reading it
        // THEN: None, no panic, and the garbage is removed
        let (surface, cache) = durable(64 * 1024);
        surface
            .set_item(&format!("api_cache_{}", key(1)), "{not json")
            .expect("fits");

        assert_eq!(cache.get(&key(1)), None);
        assert!(surface.is_empty());
    }

    #[test]
    fn quota_pressure_evicts_a_quarter_without_failing() {
        // GIVEN: a surface filled to capacity with 8 entries
        let entry = CacheEntry::new(json!({"v": "x"}));
        let size = format!("api_cache_{}", key(0)).len()
            + serde_json::to_string(&entry).expect("serialize").len();
        let (surface, cache) = durable(size * 8);
        for n in 0..8 {
            assert_eq!(cache.set(&key(n), &entry), WriteOutcome::Stored);
        }
        assert_eq!(cache.len(), 8);

        // WHEN: one more write arrives
        let outcome = cache.set(&key(8), &entry);

        // THEN: 2 of 8 keys (25%) are evicted and the write is dropped
        assert_eq!(outcome, WriteOutcome::Evicted(2));
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.get(&key(8)), None);
        assert_eq!(surface.len(), 6);
    }

    #[test]
    fn eviction_rounds_up_for_small_caches() {
        let (_surface, cache) = durable(64 * 1024);
        cache.set(&key(1), &CacheEntry::new(json!(1)));
        assert_eq!(cache.evict(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_leaves_foreign_keys_alone() {
        let (surface, cache) = durable(64 * 1024);
        surface.set_item("app_build_hash", "abc").expect("fits");
        surface.set_item("api_cachelike", "x").expect("fits");
        cache.set(&key(1), &CacheEntry::new(json!(1)));
        cache.set(&key(2), &CacheEntry::new(json!(2)));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(surface.get_item("app_build_hash").as_deref(), Some("abc"));
        assert_eq!(surface.get_item("api_cachelike").as_deref(), Some("x"));
    }

    #[test]
    fn remove_deletes_single_entry() {
        let (_surface, cache) = durable(64 * 1024);
        cache.set(&key(1), &CacheEntry::new(json!(1)));
        cache.set(&key(2), &CacheEntry::new(json!(2)));

        cache.remove(&key(1));
        assert_eq!(cache.get(&key(1)), None);
        assert_eq!(cache.len(), 1);
    }
}
