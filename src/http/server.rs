//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared [`AppState`] once at startup
//! - Create the Axum router with every API route
//! - Wire up middleware (rate limit, body limits, timeout, backpressure,
//!   security headers, CORS, request IDs and tracing)
//! - Spawn background tasks (health monitor, rate-limit sweeper, config reload)
//! - Serve plain HTTP or TLS with graceful shutdown

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::api;
use crate::auth::TokenService;
use crate::chat::ChatHub;
use crate::config::validation::validate_config;
use crate::config::PortalConfig;
use crate::health::active::HealthMonitor;
use crate::http::request::{track_requests, with_request_tracing};
use crate::images::{build_store, ImageCache};
use crate::lifecycle;
use crate::net::tls::{load_tls_config, TlsError};
use crate::security::headers::{cors_layer, with_security_headers};
use crate::security::rate_limit::{rate_limit_middleware, run_sweeper};
use crate::security::{ConnectionTracker, RateLimiterState};
use crate::upstream::UpstreamRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PortalConfig>,
    pub db: SqlitePool,
    /// Shared outbound client for images, upstreams and health checks.
    pub http: reqwest::Client,
    pub tokens: Arc<TokenService>,
    pub chat: Arc<ChatHub>,
    pub ws_connections: Arc<ConnectionTracker>,
    /// `None` when the image cache is disabled.
    pub images: Option<Arc<ImageCache>>,
    pub upstreams: Arc<UpstreamRegistry>,
    pub request_count: Arc<AtomicUsize>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: PortalConfig, db: SqlitePool) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(format!("portal-api/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self::with_http(config, db, http))
    }

    /// Build the state around an existing outbound client.
    pub fn with_http(config: PortalConfig, db: SqlitePool, http: reqwest::Client) -> Self {
        let images = config.images.enabled.then(|| {
            Arc::new(ImageCache::new(
                db.clone(),
                build_store(&config.images.store),
                http.clone(),
                config.images.clone(),
            ))
        });

        Self {
            tokens: Arc::new(TokenService::new(&config.auth)),
            chat: Arc::new(ChatHub::new(config.chat.broadcast_capacity)),
            ws_connections: Arc::new(ConnectionTracker::new(config.chat.max_ws_connections_per_user)),
            upstreams: Arc::new(UpstreamRegistry::from_config(&config, http.clone())),
            images,
            http,
            db,
            request_count: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// HTTP server for the portal API.
pub struct HttpServer {
    router: Router,
    state: AppState,
    limiter: Option<Arc<RateLimiterState>>,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let limiter = state
            .config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiterState::new(&state.config.rate_limit)));
        let router = Self::build_router(state.clone(), limiter.clone());
        Self { router, state, limiter }
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, limiter: Option<Arc<RateLimiterState>>) -> Router {
        let config = Arc::clone(&state.config);
        let body_limit = config.security.max_body_size;

        let mut router = api::routes()
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(state.request_count.clone(), track_requests))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections));

        if let Some(limiter) = limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }
        if config.security.enable_headers {
            router = with_security_headers(router);
        }
        if let Some(cors) = cors_layer(&config.security.cors_origins) {
            router = router.layer(cors);
        }

        with_request_tracing(router)
    }

    /// Run the server, accepting connections on the given listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<PortalConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let config = Arc::clone(&self.state.config);
        let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);

        let monitor = HealthMonitor::new(
            self.state.upstreams.clone(),
            config.health_check.clone(),
            self.state.http.clone(),
        );
        tokio::spawn(monitor.run(shutdown.resubscribe()));

        if let Some(limiter) = self.limiter.clone() {
            let idle = Duration::from_secs(config.rate_limit.idle_bucket_secs);
            tokio::spawn(run_sweeper(limiter, idle, shutdown.resubscribe()));
        }

        tokio::spawn(reload_loop(self.state.clone(), config_updates, shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        match &config.listener.tls {
            Some(tls) => {
                let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
                tracing::info!(address = %addr, "HTTPS server starting");

                let handle = axum_server::Handle::new();
                let trigger = handle.clone();
                let stop = shutdown.resubscribe();
                tokio::spawn(async move {
                    lifecycle::shutdown::wait(stop).await;
                    trigger.graceful_shutdown(Some(grace));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            None => {
                tracing::info!(address = %addr, "HTTP server starting");

                let serve = axum::serve(listener, app)
                    .with_graceful_shutdown(lifecycle::shutdown::wait(shutdown.resubscribe()))
                    .into_future();

                // Open sockets would otherwise hold shutdown forever.
                let mut deadline = shutdown.resubscribe();
                tokio::select! {
                    result = serve => result?,
                    _ = async {
                        let _ = deadline.recv().await;
                        tokio::time::sleep(grace).await;
                    } => {
                        tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping open connections");
                    }
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Config sections that only take effect after a restart.
pub fn restart_required(old: &PortalConfig, new: &PortalConfig) -> Vec<&'static str> {
    fn differs<T: serde::Serialize>(a: &T, b: &T) -> bool {
        serde_json::to_value(a).ok() != serde_json::to_value(b).ok()
    }

    let mut sections = Vec::new();
    if differs(&old.listener, &new.listener) {
        sections.push("listener");
    }
    if differs(&old.database, &new.database) {
        sections.push("database");
    }
    if differs(&old.auth, &new.auth) {
        sections.push("auth");
    }
    if differs(&old.timeouts, &new.timeouts) {
        sections.push("timeouts");
    }
    if differs(&old.rate_limit, &new.rate_limit) {
        sections.push("rate_limit");
    }
    if differs(&old.images, &new.images) {
        sections.push("images");
    }
    if differs(&old.chat, &new.chat) {
        sections.push("chat");
    }
    if differs(&old.social, &new.social) {
        sections.push("social");
    }
    if differs(&old.security, &new.security) {
        sections.push("security");
    }
    if differs(&old.admin, &new.admin) {
        sections.push("admin");
    }
    sections
}

/// Apply validated config updates: upstream groups swap live, the rest waits for a restart.
async fn reload_loop(
    state: AppState,
    mut updates: mpsc::UnboundedReceiver<PortalConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            Some(new_config) = updates.recv() => {
                if let Err(errors) = validate_config(&new_config) {
                    for error in &errors {
                        tracing::warn!(error = %error, "Rejected config reload");
                    }
                    continue;
                }

                state.upstreams.reload(&new_config);
                tracing::info!(groups = new_config.upstreams.len(), "Upstream groups reloaded");

                for section in restart_required(&state.config, &new_config) {
                    tracing::warn!(section, "Config section changed; requires restart to take effect");
                }
            }
            _ = shutdown.recv() => break,
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_required_sections() {
        let old = PortalConfig::default();
        let mut new = PortalConfig::default();
        assert!(restart_required(&old, &new).is_empty());

        new.chat.max_message_len = 10;
        new.listener.bind_address = "127.0.0.1:9999".to_string();
        new.upstreams.clear();
        assert_eq!(restart_required(&old, &new), vec!["listener", "chat"]);
    }
}
