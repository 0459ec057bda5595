//! Durable key/value surfaces backing the durable cache tier.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use thiserror::Error;

/// Failure reported by a durable surface on write
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The write would exceed the surface's byte quota
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        /// Bytes the write required
        needed: usize,
        /// Bytes still free
        available: usize,
    },

    /// Underlying storage failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A persistent string key/value store with bounded capacity.
///
/// Shaped after browser local storage: synchronous, string values, and a
/// natural enumeration order for [`keys`](Self::keys). Other data may share
/// the surface with the cache, so callers namespace their keys.
pub trait DurableSurface: Send + Sync {
    /// Read a value
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write a value, failing with [`SurfaceError::QuotaExceeded`] when full
    fn set_item(&self, key: &str, value: &str) -> Result<(), SurfaceError>;

    /// Remove a value; missing keys are ignored
    fn remove_item(&self, key: &str);

    /// All keys in the surface's natural iteration order
    fn keys(&self) -> Vec<String>;
}

/// In-process surface with a byte quota.
///
/// Usage counts key and value bytes. Keys enumerate in sorted order.
pub struct MemorySurface {
    items: Mutex<BTreeMap<String, String>>,
    quota_bytes: usize,
}

impl MemorySurface {
    /// Create an empty surface holding at most `quota_bytes`
    #[must_use]
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            quota_bytes,
        }
    }

    /// Bytes currently used
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        used(&self.items.lock())
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Return `true` when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

fn used(items: &BTreeMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl DurableSurface for MemorySurface {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SurfaceError> {
        let mut items = self.items.lock();
        let replaced = items.get(key).map_or(0, |old| key.len() + old.len());
        let in_use = used(&items) - replaced;
        let needed = key.len() + value.len();
        let available = self.quota_bytes.saturating_sub(in_use);
        if needed > available {
            return Err(SurfaceError::QuotaExceeded { needed, available });
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        self.items.lock().remove(key);
    }

    fn keys(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let surface = MemorySurface::new(1024);
        surface.set_item("a", "1").expect("fits");
        assert_eq!(surface.get_item("a").as_deref(), Some("1"));

        surface.remove_item("a");
        assert_eq!(surface.get_item("a"), None);
        surface.remove_item("missing");
    }

    #[test]
    fn quota_is_enforced() {
        let surface = MemorySurface::new(10);
        surface.set_item("k", "12345").expect("6 bytes fit");

        let err = surface.set_item("j", "12345").expect_err("12 bytes exceed quota");
        assert!(matches!(
            err,
            SurfaceError::QuotaExceeded {
                needed: 6,
                available: 4
            }
        ));
        assert_eq!(surface.len(), 1);
    }

    #[test]
    fn replacing_a_value_reuses_its_bytes() {
        let surface = MemorySurface::new(10);
        surface.set_item("k", "123456789").expect("fits exactly");
        surface.set_item("k", "987654321").expect("replacement fits");
        assert_eq!(surface.used_bytes(), 10);
    }

    #[test]
    fn keys_enumerate_sorted() {
        let surface = MemorySurface::new(1024);
        surface.set_item("b", "").expect("fits");
        surface.set_item("a", "").expect("fits");
        surface.set_item("c", "").expect("fits");
        assert_eq!(surface.keys(), vec!["a", "b", "c"]);
    }
}
