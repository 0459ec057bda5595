//! Startup warm-up of the preload cache.
//!
//! Every entity (the country plus each department in the dataset) gets one
//! load per published [`DataKind`]. Kinds of one entity load concurrently;
//! up to `concurrency` entities are in progress at once.

use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::preload::PreloadCache;
use super::source::{DataKind, DataSource, Entity};
use crate::Result;
use crate::config::PreloadConfig;

/// Outcome of a warm-up run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    /// Entities visited
    pub entities: usize,
    /// Entries stored
    pub loaded: usize,
    /// Loads that failed
    pub failed: usize,
}

impl WarmupReport {
    fn merge(mut self, other: Self) -> Self {
        self.entities += other.entities;
        self.loaded += other.loaded;
        self.failed += other.failed;
        self
    }
}

/// Populate `cache` from `source`.
///
/// Only listing the departments can fail the run; individual loads are
/// logged and counted.
pub async fn warm_up(
    cache: &PreloadCache,
    source: &dyn DataSource,
    config: &PreloadConfig,
) -> Result<WarmupReport> {
    let mut entities = vec![Entity::Country];
    entities.extend(source.departments().await?.into_iter().map(Entity::Department));
    info!(entities = entities.len(), "Warming preload cache");

    let report = stream::iter(entities)
        .map(|entity| warm_entity(cache, source, config, entity))
        .buffer_unordered(config.concurrency.max(1))
        .fold(WarmupReport::default(), |acc, report| async move {
            acc.merge(report)
        })
        .await;

    info!(
        entities = report.entities,
        loaded = report.loaded,
        failed = report.failed,
        "Preload cache warm"
    );
    Ok(report)
}

/// TTL of a preloaded entry of `kind`
pub(super) fn ttl_for(config: &PreloadConfig, kind: DataKind) -> Duration {
    if kind.is_snapshot() {
        config.snapshot_ttl
    } else {
        config.default_ttl
    }
}

async fn warm_entity(
    cache: &PreloadCache,
    source: &dyn DataSource,
    config: &PreloadConfig,
    entity: Entity,
) -> WarmupReport {
    let kinds = DataKind::for_entity(&entity);
    let loads = join_all(kinds.iter().map(|&kind| source.load(&entity, kind))).await;

    let mut report = WarmupReport {
        entities: 1,
        ..WarmupReport::default()
    };
    for (kind, result) in kinds.into_iter().zip(loads) {
        match result {
            Ok(value) => {
                cache.set(
                    PreloadCache::key(&entity, kind),
                    value,
                    Some(ttl_for(config, kind)),
                );
                report.loaded += 1;
            }
            Err(e) => {
                warn!(entity = %entity, kind = %kind, error = %e, "Preload failed");
                report.failed += 1;
            }
        }
    }
    debug!(entity = %entity, loaded = report.loaded, "Entity warmed");
    report
}
