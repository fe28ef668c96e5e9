use std::sync::atomic::Ordering;

use axum::extract::State;
use serde::Serialize;

use crate::db::images::{ImageRecord, ImageStats};
use crate::error::ApiError;
use crate::http::response::{ok, ApiResponse};
use crate::http::server::AppState;
use crate::upstream::registry::GroupStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub total_requests: usize,
    pub ws_connections: usize,
    pub active_chat_rooms: usize,
    pub upstream_groups: usize,
}

#[derive(Serialize)]
pub struct ImageCacheStatus {
    pub enabled: bool,
    pub store: Option<&'static str>,
    #[serde(flatten)]
    pub stats: ImageStats,
}

#[derive(Serialize)]
pub struct CacheEntry {
    pub group: String,
    pub entries: u64,
}

#[derive(Serialize)]
pub struct CacheCleared {
    pub cleared_groups: usize,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResponse<SystemStatus> {
    ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        total_requests: state.request_count.load(Ordering::Relaxed),
        ws_connections: state.ws_connections.total(),
        active_chat_rooms: state.chat.active_rooms(),
        upstream_groups: state.upstreams.clients().len(),
    })
}

pub async fn get_upstreams(State(state): State<AppState>) -> ApiResponse<Vec<GroupStatus>> {
    ok(state.upstreams.statuses())
}

pub async fn get_images(State(state): State<AppState>) -> Result<ApiResponse<ImageCacheStatus>, ApiError> {
    let stats = ImageRecord::stats(&state.db).await?;
    Ok(ok(ImageCacheStatus {
        enabled: state.images.is_some(),
        store: state.images.as_ref().map(|cache| cache.store_kind()),
        stats,
    }))
}

pub async fn get_cache(State(state): State<AppState>) -> ApiResponse<Vec<CacheEntry>> {
    ok(state
        .upstreams
        .statuses()
        .into_iter()
        .map(|group| CacheEntry {
            group: group.name,
            entries: group.cache_entries,
        })
        .collect())
}

pub async fn clear_cache(State(state): State<AppState>) -> ApiResponse<CacheCleared> {
    state.upstreams.clear_caches();
    let cleared_groups = state.upstreams.clients().len();
    tracing::info!(groups = cleared_groups, "Upstream response caches cleared");
    ok(CacheCleared { cleared_groups })
}
