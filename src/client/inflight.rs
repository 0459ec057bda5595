//! Request coalescing
//!
//! At most one network call runs per key. Later callers for the same key
//! join the running call and observe its exact result, success or failure.
//!
//! # How it works
//!
//! 1. The orchestrator calls [`InFlightRegistry::join_or_register`] with the
//!    request key and a closure that builds the network future.
//! 2. The key is looked up and, if absent, inserted in one atomic map entry
//!    operation, so two racing callers can never both start a call.
//! 3. The registered future removes its own entry when it settles, on every
//!    path, so a failed call never blocks a retry.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tracing::debug;

use crate::Error;
use crate::cache::CacheKey;

/// Outcome of a coalesced call, cloneable for every joiner
pub type FetchResult = std::result::Result<Value, Arc<Error>>;

/// A network call that any number of callers can await
pub type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// How a caller got hold of a [`SharedFetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This caller registered the call
    Leader,
    /// This caller joined a call already in flight
    Follower,
}

/// Removes the registry entry when the owning future finishes or unwinds
struct SettleGuard {
    entries: Arc<DashMap<CacheKey, SharedFetch>>,
    key: CacheKey,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.entries.remove(&self.key);
        debug!(key = %self.key, "In-flight request settled");
    }
}

/// Keyed registry of running network calls
#[derive(Default)]
pub struct InFlightRegistry {
    entries: Arc<DashMap<CacheKey, SharedFetch>>,
}

impl InFlightRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `true` when a call for `key` is running
    #[must_use]
    pub fn has(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The running call for `key`, if any
    #[must_use]
    pub fn join(&self, key: &CacheKey) -> Option<SharedFetch> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Register `fetch` under `key` unless a call is already running.
    ///
    /// Returns the running call either way. `fetch` is only invoked for the
    /// leader; followers never build a second future.
    pub fn join_or_register<F, Fut>(&self, key: CacheKey, fetch: F) -> (SharedFetch, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(running) => {
                debug!(key = %key, "Joining in-flight request");
                (running.get().clone(), Role::Follower)
            }
            Entry::Vacant(slot) => {
                let guard = SettleGuard {
                    entries: Arc::clone(&self.entries),
                    key,
                };
                let call = fetch();
                let shared = async move {
                    let _guard = guard;
                    call.await
                }
                .boxed()
                .shared();
                slot.insert(shared.clone());
                (shared, Role::Leader)
            }
        }
    }

    /// Register `fetch` under `key`, returning the running call for `key`
    pub fn register<Fut>(&self, key: CacheKey, fetch: Fut) -> SharedFetch
    where
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        self.join_or_register(key, || fetch).0
    }

    /// Number of calls in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` when nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn key(name: &str) -> CacheKey {
        CacheKey::derive(name, &json!({}))
    }

    #[tokio::test]
    async fn followers_share_the_leaders_result() {
        // GIVEN: a call that stays pending until released
        let registry = InFlightRegistry::new();
        let release = Arc::new(Notify::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let mut calls = Vec::new();
        for _ in 0..3 {
            let release = Arc::clone(&release);
            let starts = Arc::clone(&starts);
            let (call, _) = registry.join_or_register(key("/a"), move || async move {
                starts.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok(json!({"dep": "75"}))
            });
            calls.push(call);
        }

        // WHEN: the call is released
        assert!(registry.has(&key("/a")));
        let waiters = tokio::spawn(futures::future::join_all(calls));
        tokio::time::sleep(Duration::from_millis(10)).await;
        release.notify_one();
        let results = waiters.await.expect("join");

        // THEN: one execution, three identical results, registry empty
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.expect("ok"), json!({"dep": "75"}));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn roles_identify_leader_and_follower() {
        let registry = InFlightRegistry::new();
        let (_, first) = registry.join_or_register(key("/a"), || async { Ok(json!(1)) });
        let (_, second) = registry.join_or_register(key("/a"), || async { Ok(json!(2)) });
        assert_eq!(first, Role::Leader);
        assert_eq!(second, Role::Follower);
    }

    #[tokio::test]
    async fn failure_is_shared_and_clears_the_entry() {
        let registry = InFlightRegistry::new();
        let leader = registry.register(key("/fail"), async {
            Err(Arc::new(Error::Status {
                endpoint: "/fail".to_string(),
                status: 500,
            }))
        });
        let follower = registry.join(&key("/fail")).expect("in flight");

        let (a, b) = futures::join!(leader, follower);
        assert!(a.is_err());
        assert!(b.is_err());
        assert!(!registry.has(&key("/fail")), "failed call must not block retries");

        // A retry starts a new call
        let (_, role) = registry.join_or_register(key("/fail"), || async { Ok(json!("ok")) });
        assert_eq!(role, Role::Leader);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let registry = InFlightRegistry::new();
        let a = registry.register(key("/a"), async { Ok(json!("a")) });
        let b = registry.register(key("/b"), async { Ok(json!("b")) });
        assert_eq!(registry.len(), 2);

        assert_eq!(a.await.expect("ok"), json!("a"));
        assert_eq!(b.await.expect("ok"), json!("b"));
        assert!(registry.is_empty());
    }
}
