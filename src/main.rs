//! Portal API server.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────────────────┐
//!                │                          PORTAL API                          │
//!                │                                                              │
//!   Client ──────┼─▶ request id / trace ─▶ cors / headers ─▶ rate limit ─▶ api   │
//!                │                                                      │       │
//!                │        ┌──────────────┬──────────────┬───────────────┼──────┐│
//!                │        ▼              ▼              ▼               ▼      ││
//!                │     auth + db     chat hub       image cache     upstream   ││
//!                │     (sqlx)      (broadcast)    (object store)   fallback   ││
//!                │                                                    │        ││
//!                │  health monitor ◀──────────────────────────────────┘        ││
//!                │                                                              │
//!                │  config watcher · shutdown coordinator · admin listener      │
//!                └──────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use portal_api::admin;
use portal_api::config::loader::load_config;
use portal_api::config::schema::DEFAULT_JWT_SECRET;
use portal_api::config::watcher::ConfigWatcher;
use portal_api::db;
use portal_api::lifecycle::signals::spawn_signal_handler;
use portal_api::observability::{logging, metrics};
use portal_api::{AppState, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "portal-api")]
#[command(about = "Portal backend API server", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env = "PORTAL_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "portal-api starting");
    if config.auth.jwt_secret == DEFAULT_JWT_SECRET {
        tracing::warn!("auth.jwt_secret is the built-in placeholder; set PORTAL_JWT_SECRET in production");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        upstream_groups = config.upstreams.len(),
        images_enabled = config.images.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let pool = db::connect(&config.database).await?;
    db::migrate(&pool).await?;
    tracing::info!(url = %config.database.url, "Database ready");

    let shutdown = Shutdown::new();
    spawn_signal_handler(&shutdown);

    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    // Dropping the handle stops the watch.
    let _watch_handle = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload unavailable");
            None
        }
    };

    let state = AppState::new(config.clone(), pool)?;

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        Some(tokio::spawn(admin::serve(state.clone(), listener, shutdown.subscribe())))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(state.clone());
    let result = server.run(listener, config_updates, shutdown.subscribe()).await;

    // A failed server should still release the other tasks.
    shutdown.trigger();
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin task panicked"),
            Ok(Ok(())) => {}
        }
    }
    state.db.close().await;

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
