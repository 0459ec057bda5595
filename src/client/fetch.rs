//! Fetch orchestrator
//!
//! [`ApiClient::request`] walks the tiers in order and stops at the first
//! hit: memory, then durable (after the build version guard), then a
//! coalesced network call whose result is written back to the tiers.
//! Failures are logged and surface as `None`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::inflight::{FetchResult, InFlightRegistry, Role};
use super::policy::{DurablePolicy, Persistence};
use super::transport::{ApiRequest, HttpTransport, RequestOptions, Transport};
use super::version::{BuildVersionGuard, ClientHooks, NoopHooks, VersionCheck};
use crate::build_info::EMBEDDED_BUILD_HASH;
use crate::cache::{
    CacheEntry, CacheKey, DEFAULT_PREFIX, DurableCache, DurableSurface, FileSurface, MemoryCache,
    MemorySurface,
};
use crate::config::ClientConfig;
use crate::{Error, Result};

/// Default time-to-live of cached responses
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default delay between a build change and the reload request
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(500);

/// Default byte budget of the durable tier
pub const DEFAULT_DURABLE_QUOTA: u64 = 5 * 1024 * 1024;

/// Entry counts per tier, as returned by [`ApiClient::cache_stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries in the memory tier
    pub memory: usize,
    /// Entries in the durable tier
    pub persistent: usize,
    /// Sum of both tiers
    pub total: usize,
}

/// Cache-aware API client
pub struct ApiClient {
    memory: Arc<MemoryCache>,
    durable: Arc<DurableCache>,
    guard: BuildVersionGuard,
    inflight: InFlightRegistry,
    transport: Arc<dyn Transport>,
    policy: DurablePolicy,
}

impl ApiClient {
    /// Start building a client
    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Client over HTTP with a file-backed durable tier, as configured
    pub fn from_config(config: &ClientConfig, hooks: Arc<dyn ClientHooks>) -> Result<Self> {
        let transport = HttpTransport::new(&config.base_url, config.request_timeout)?;
        let surface = match config.durable_dir {
            Some(ref dir) => FileSurface::new(dir.clone(), config.durable_max_bytes)?,
            None => FileSurface::default_location(config.durable_max_bytes)?,
        };

        Self::builder()
            .transport(Arc::new(transport))
            .surface(Arc::new(surface))
            .hooks(hooks)
            .memory_ttl(config.memory_ttl)
            .reload_delay(config.reload_delay)
            .policy(DurablePolicy::new(config.durable_routes.iter().cloned()))
            .build()
    }

    /// GET `endpoint` through the caches
    pub async fn get(&self, endpoint: &str) -> Option<Value> {
        self.request(endpoint, &RequestOptions::default(), true).await
    }

    /// Fetch `endpoint`, serving from the caches when `use_cache` is set.
    ///
    /// Never fails: network errors and non-2xx statuses are logged and
    /// yield `None`, as does a `null` payload.
    pub async fn request(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        use_cache: bool,
    ) -> Option<Value> {
        let (path, options) = options.normalized(endpoint);
        let key = CacheKey::derive(&path, &options);

        if use_cache {
            if let Some(entry) = self.memory.get(&key) {
                debug!(endpoint, "Memory cache hit");
                return Some(entry.payload);
            }

            self.guard.ensure_checked().await;

            if let Some(entry) = self.durable.get(&key) {
                if entry.is_expired(self.memory.ttl()) {
                    debug!(endpoint, "Durable entry expired");
                    self.durable.remove(&key);
                } else {
                    debug!(endpoint, "Durable cache hit, promoting");
                    let payload = entry.payload.clone();
                    self.memory.set(key, entry);
                    return Some(payload);
                }
            }
        }

        let (call, role) = self.inflight.join_or_register(key.clone(), || {
            fetch(Arc::clone(&self.transport), options.to_request(&path))
        });
        if role == Role::Follower {
            debug!(endpoint, "Coalesced onto in-flight request");
        }

        let payload = match call.await {
            Ok(Value::Null) => return None,
            Ok(payload) => payload,
            Err(e) => {
                warn!(endpoint, error = %e, "API request failed");
                return None;
            }
        };

        // Stored per caller; the shared call may belong to a bypassing one
        if use_cache {
            let entry = CacheEntry::new(payload.clone());
            if self.policy.resolve(&path, options.persistence) == Persistence::Durable {
                self.durable.set(&key, &entry);
            }
            self.memory.set(key, entry);
        }
        Some(payload)
    }

    /// Drop every cached response from both tiers
    pub fn clear_cache(&self) {
        self.memory.clear();
        let removed = self.durable.clear();
        debug!(removed, "Cache cleared");
    }

    /// Entry counts per tier
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        let memory = self.memory.len();
        let persistent = self.durable.len();
        CacheStats {
            memory,
            persistent,
            total: memory + persistent,
        }
    }

    /// Run the build version check if it has not run yet and return its outcome
    pub async fn version_check(&self) -> &VersionCheck {
        self.guard.ensure_checked().await
    }

    /// Number of network calls currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

async fn fetch(transport: Arc<dyn Transport>, request: ApiRequest) -> FetchResult {
    let endpoint = request.endpoint.clone();
    let response = transport.send(request).await.map_err(Arc::new)?;
    if !response.is_success() {
        return Err(Arc::new(Error::Status {
            endpoint,
            status: response.status,
        }));
    }
    Ok(response.body)
}

/// Builder for [`ApiClient`]
pub struct ApiClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    surface: Option<Arc<dyn DurableSurface>>,
    hooks: Arc<dyn ClientHooks>,
    memory_ttl: Duration,
    reload_delay: Duration,
    embedded_build: Option<String>,
    policy: DurablePolicy,
    prefix: String,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            surface: None,
            hooks: Arc::new(NoopHooks),
            memory_ttl: DEFAULT_MEMORY_TTL,
            reload_delay: DEFAULT_RELOAD_DELAY,
            embedded_build: EMBEDDED_BUILD_HASH.map(str::to_string),
            policy: DurablePolicy::default(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl ApiClientBuilder {
    /// Network transport (required)
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Durable surface (default: in-process, 5 MiB)
    #[must_use]
    pub fn surface(mut self, surface: Arc<dyn DurableSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Host hooks driven on a build change
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn ClientHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Time-to-live of cached responses
    #[must_use]
    pub fn memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = ttl;
        self
    }

    /// Delay between a build change and the reload request
    #[must_use]
    pub fn reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    /// Build hash compiled into the client; `None` forces the version endpoint
    #[must_use]
    pub fn embedded_build(mut self, hash: Option<String>) -> Self {
        self.embedded_build = hash;
        self
    }

    /// Durable persistence policy
    #[must_use]
    pub fn policy(mut self, policy: DurablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Key prefix of durable cache entries
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Assemble the client
    pub fn build(self) -> Result<ApiClient> {
        let transport = self
            .transport
            .ok_or_else(|| Error::Config("ApiClient requires a transport".to_string()))?;
        let surface = self.surface.unwrap_or_else(|| {
            let quota = usize::try_from(DEFAULT_DURABLE_QUOTA).unwrap_or(usize::MAX);
            Arc::new(MemorySurface::new(quota))
        });

        let memory = Arc::new(MemoryCache::new(self.memory_ttl));
        let durable = Arc::new(DurableCache::with_prefix(surface, self.prefix));
        let guard = BuildVersionGuard::new(
            self.embedded_build,
            Arc::clone(&memory),
            Arc::clone(&durable),
            Arc::clone(&transport),
            self.hooks,
            self.reload_delay,
        );

        Ok(ApiClient {
            memory,
            durable,
            guard,
            inflight: InFlightRegistry::new(),
            transport,
            policy: self.policy,
        })
    }
}
