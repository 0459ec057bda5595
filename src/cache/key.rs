//! Cache key derivation.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Deterministic key for a logical request.
///
/// The key is the hex-encoded SHA-256 digest of
/// `"{endpoint}\0{canonical_json(options)}"`. `serde_json` maps are
/// ordered, so logically identical options always serialize the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `endpoint` called with `options`
    #[must_use]
    pub fn derive<O: Serialize + ?Sized>(endpoint: &str, options: &O) -> Self {
        let canonical = serde_json::to_value(options)
            .and_then(|value| serde_json::to_string(&value))
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(endpoint.as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-derived key (e.g. one read back from storage)
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
