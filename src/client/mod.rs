//! Cache-aware API client
//!
//! [`ApiClient`] ties together the two cache tiers, the build version
//! guard, the in-flight registry and a [`Transport`]. Construct one per
//! process and share it.

mod fetch;
mod inflight;
mod policy;
mod transport;
mod version;

pub use fetch::{
    ApiClient, ApiClientBuilder, CacheStats, DEFAULT_DURABLE_QUOTA, DEFAULT_MEMORY_TTL,
    DEFAULT_RELOAD_DELAY,
};
pub use inflight::{FetchResult, InFlightRegistry, Role, SharedFetch};
pub use policy::{DEFAULT_DURABLE_ROUTES, DurablePolicy, Persistence};
pub use transport::{
    ApiRequest, ApiResponse, DEFAULT_CONTENT_TYPE, HttpTransport, RequestOptions, Transport,
};
pub use version::{
    BUILD_SLOT, BuildVersionGuard, ClientHooks, NoopHooks, VersionCheck, WorkerMessage,
};
