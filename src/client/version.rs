//! Build version guard
//!
//! Runs once per client lifetime, before any durable entry is trusted:
//!
//! 1. Resolve the current build hash, preferring the one compiled into the
//!    client and falling back to `GET /version`.
//! 2. Compare it with the hash recorded on the durable surface.
//! 3. On a change, clear both cache tiers, tell the worker to drop its cache,
//!    record the new hash and schedule a reload.
//!
//! A version endpoint that cannot be reached is logged and the guard
//! completes anyway.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::transport::{ApiRequest, Transport};
use crate::build_info::{BuildVersion, VERSION_ENDPOINT, VersionInfo};
use crate::cache::{DurableCache, DurableSurface, MemoryCache};

/// Durable slot holding the last trusted build hash, outside the cache prefix
pub const BUILD_SLOT: &str = "app_build_hash";

/// Message sent to a background worker that keeps its own cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Drop every cached response
    ClearCache,
}

/// Host integration points the guard drives on a build change
pub trait ClientHooks: Send + Sync {
    /// Deliver a message to the attached background worker, if any
    fn notify_worker(&self, message: &WorkerMessage);

    /// Restart the client so it runs the new build
    fn reload(&self);
}

/// Hooks for hosts without a worker or a reload mechanism
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ClientHooks for NoopHooks {
    fn notify_worker(&self, message: &WorkerMessage) {
        debug!(?message, "No worker attached");
    }

    fn reload(&self) {
        debug!("Reload requested but host cannot reload");
    }
}

/// What the guard concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// No hash was recorded; the current one is now recorded
    FirstRun(BuildVersion),
    /// Recorded hash matches
    Unchanged(BuildVersion),
    /// Recorded hash differed; caches were cleared and a reload scheduled
    Changed {
        /// Hash recorded before this run
        previous: String,
        /// Hash now recorded
        current: BuildVersion,
    },
    /// No hash could be resolved; caches are trusted as-is
    Unavailable,
}

/// One-shot build version check with a shared completion signal
pub struct BuildVersionGuard {
    embedded: Option<String>,
    surface: Arc<dyn DurableSurface>,
    memory: Arc<MemoryCache>,
    durable: Arc<DurableCache>,
    transport: Arc<dyn Transport>,
    hooks: Arc<dyn ClientHooks>,
    reload_delay: Duration,
    outcome: OnceCell<VersionCheck>,
}

impl BuildVersionGuard {
    /// Create a guard over both cache tiers
    #[must_use]
    pub fn new(
        embedded: Option<String>,
        memory: Arc<MemoryCache>,
        durable: Arc<DurableCache>,
        transport: Arc<dyn Transport>,
        hooks: Arc<dyn ClientHooks>,
        reload_delay: Duration,
    ) -> Self {
        Self {
            embedded,
            surface: Arc::clone(durable.surface()),
            memory,
            durable,
            transport,
            hooks,
            reload_delay,
            outcome: OnceCell::new(),
        }
    }

    /// Run the check on first call; every caller awaits the same outcome
    pub async fn ensure_checked(&self) -> &VersionCheck {
        self.outcome.get_or_init(|| self.check()).await
    }

    /// Outcome if the check has completed
    #[must_use]
    pub fn outcome(&self) -> Option<&VersionCheck> {
        self.outcome.get()
    }

    async fn check(&self) -> VersionCheck {
        let Some(current) = self.current_version().await else {
            return VersionCheck::Unavailable;
        };

        match self.surface.get_item(BUILD_SLOT) {
            None => {
                self.record(&current.hash);
                info!(hash = %current.hash, source = ?current.source, "Recorded client build");
                VersionCheck::FirstRun(current)
            }
            Some(previous) if previous == current.hash => {
                debug!(hash = %current.hash, "Client build unchanged");
                VersionCheck::Unchanged(current)
            }
            Some(previous) => {
                info!(
                    previous = %previous,
                    current = %current.hash,
                    "Client build changed, invalidating caches"
                );
                self.memory.clear();
                let cleared = self.durable.clear();
                self.hooks.notify_worker(&WorkerMessage::ClearCache);
                self.record(&current.hash);
                self.schedule_reload();
                debug!(cleared, "Durable cache cleared after build change");
                VersionCheck::Changed { previous, current }
            }
        }
    }

    async fn current_version(&self) -> Option<BuildVersion> {
        if let Some(ref hash) = self.embedded {
            return Some(BuildVersion::embedded(hash.clone()));
        }

        let response = match self.transport.send(ApiRequest::get(VERSION_ENDPOINT)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Version check failed, continuing without it");
                return None;
            }
        };
        if !response.is_success() {
            warn!(status = response.status, "Version endpoint returned an error");
            return None;
        }
        match serde_json::from_value::<VersionInfo>(response.body) {
            Ok(info) => Some(BuildVersion::server(info.build_hash)),
            Err(e) => {
                warn!(error = %e, "Version endpoint returned an unexpected body");
                None
            }
        }
    }

    fn record(&self, hash: &str) {
        if let Err(e) = self.surface.set_item(BUILD_SLOT, hash) {
            warn!(error = %e, "Failed to record build hash");
        }
    }

    fn schedule_reload(&self) {
        let hooks = Arc::clone(&self.hooks);
        let delay = self.reload_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            hooks.reload();
        });
    }
}
