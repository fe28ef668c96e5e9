//! Image cache routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::api::extract::{ApiJson, ApiQuery};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::http::response::{ok, ApiResponse};
use crate::http::server::AppState;
use crate::images::{CachedImage, ImageCache, ImageCacheError};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cache", post(cache_image))
        .route("/proxy", get(proxy_image))
}

#[derive(Debug, Deserialize)]
pub struct CacheImageRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

fn image_cache(state: &AppState) -> Result<&Arc<ImageCache>, ApiError> {
    state.images.as_ref().ok_or_else(|| ImageCacheError::Disabled.into())
}

async fn cache_image(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CacheImageRequest>,
) -> Result<ApiResponse<CachedImage>, ApiError> {
    let cache = image_cache(&state)?;
    let image = cache.cache_image(req.url.trim()).await?;
    tracing::debug!(user_id = %user.id, hash = %image.hash, fresh = image.fresh, "Image cache request");
    Ok(ok(image))
}

/// Redirects to the CDN copy, caching it first if needed.
async fn proxy_image(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProxyQuery>,
) -> Result<Response, ApiError> {
    let cache = image_cache(&state)?;
    let image = cache.cache_image(query.url.trim()).await?;
    Ok((StatusCode::FOUND, [(LOCATION, image.url)]).into_response())
}
