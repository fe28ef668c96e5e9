//! Operator API on a separate listener, guarded by a static bearer key.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::http::request::with_request_tracing;
use crate::http::server::AppState;
use crate::lifecycle::shutdown;
use self::auth::admin_auth_middleware;
use self::handlers::*;

pub fn setup_admin_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/upstreams", get(get_upstreams))
        .route("/admin/images", get(get_images))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/clear", post(clear_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state);
    with_request_tracing(router)
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(state: AppState, listener: TcpListener, shutdown_rx: broadcast::Receiver<()>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API starting");

    let app = setup_admin_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait(shutdown_rx))
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
