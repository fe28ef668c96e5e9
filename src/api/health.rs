//! Liveness and readiness checks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::db;
use crate::http::response::ApiResponse;
use crate::http::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: bool,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyStatus {
    pub database: bool,
}

/// Always 200 while the process is up; `database` reports the pool separately.
async fn health(State(state): State<AppState>) -> ApiResponse<HealthStatus> {
    ApiResponse::success(HealthStatus {
        status: "ok",
        database: db::ping(&state.db).await,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn ready(State(state): State<AppState>) -> Response {
    if db::ping(&state.db).await {
        ApiResponse::success(ReadyStatus { database: true }).into_response()
    } else {
        tracing::warn!("Readiness check failed: database unreachable");
        let body = ApiResponse {
            success: false,
            data: Some(ReadyStatus { database: false }),
            message: Some("database unavailable".to_string()),
        };
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}
