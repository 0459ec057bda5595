//! statcache
//!
//! Caching and request coalescing for a statistics dashboard API.
//!
//! # Features
//!
//! - **Dual-tier client cache**: in-process memory tier plus a bounded
//!   durable tier that survives restarts
//! - **Build version guard**: durable entries are dropped when the build changes
//! - **Request coalescing**: concurrent identical requests share one network call
//! - **Server preload cache**: TTL cache warmed at startup, read-through on miss

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod build_info;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}")))?,
    }

    Ok(())
}
