//! Client-side cache tiers
//!
//! Two stores share one entry shape ([`CacheEntry`]) and one key type
//! ([`CacheKey`]):
//!
//! - [`MemoryCache`]: process-local map, TTL checked lazily on read.
//! - [`DurableCache`]: prefix-namespaced entries on a [`DurableSurface`]
//!   that survives restarts and is subject to a byte quota.
//!
//! Entries are copied between tiers, never shared by reference.

mod durable;
mod entry;
mod file_surface;
mod key;
mod memory;
mod surface;

pub use durable::{DEFAULT_PREFIX, DurableCache, WriteOutcome};
pub use entry::CacheEntry;
pub use file_surface::FileSurface;
pub use key::CacheKey;
pub use memory::MemoryCache;
pub use surface::{DurableSurface, MemorySurface, SurfaceError};
