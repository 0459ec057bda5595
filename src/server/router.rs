//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::debug;

use super::preload::PreloadCache;
use super::source::{DataKind, DataSource, Entity};
use super::warmup::ttl_for;
use crate::Error;
use crate::build_info::VersionInfo;
use crate::config::PreloadConfig;

/// Shared application state
pub struct AppState {
    /// Preload cache consulted by every read route
    pub preload: Arc<PreloadCache>,
    /// Dataset behind the cache
    pub source: Arc<dyn DataSource>,
    /// TTLs for read-through population
    pub preload_config: PreloadConfig,
    /// Body of the version endpoint
    pub version: VersionInfo,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .route("/api/cache/stats", get(stats_handler))
        .route("/api/country/{*kind}", get(country_handler))
        .route("/api/departements/{*kind}", get(department_handler))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Query of the department routes
#[derive(Debug, Deserialize)]
struct DepartmentQuery {
    dept: Option<String>,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "preloaded": state.preload.len(),
    }))
}

async fn version_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.version.clone())
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.preload.stats())
}

async fn country_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Response, Error> {
    read_through(&state, Entity::Country, &kind).await
}

async fn department_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<DepartmentQuery>,
) -> Result<Response, Error> {
    let Some(code) = query.dept.filter(|code| !code.trim().is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing required query parameter 'dept'" })),
        )
            .into_response());
    };
    read_through(&state, Entity::Department(code), &kind).await
}

/// Serve from the preload cache, falling back to the data source.
///
/// Only the names family is written back on a miss.
async fn read_through(state: &AppState, entity: Entity, path: &str) -> Result<Response, Error> {
    let kind = DataKind::from_path(path)
        .filter(|kind| DataKind::for_entity(&entity).contains(kind))
        .ok_or_else(|| Error::NotFound(format!("/{path} for {entity}")))?;

    let key = PreloadCache::key(&entity, kind);
    if let Some(value) = state.preload.get(&key) {
        debug!(key = %key, "Preload hit");
        return Ok(Json(value).into_response());
    }

    let value = state.source.load(&entity, kind).await?;
    if kind.caches_on_miss() {
        state
            .preload
            .set(key, value.clone(), Some(ttl_for(&state.preload_config, kind)));
    }
    Ok(Json(value).into_response())
}
