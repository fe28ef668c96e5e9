//! Persistence subsystem (sqlite via sqlx).
//!
//! # Data Flow
//! ```text
//! connect() → SqlitePool (foreign keys on, file created if missing)
//!     → migrate() applies ./migrations at startup
//!     → model modules (users, chat, social, images) run queries on the pool
//! ```
//!
//! # Design Decisions
//! - Queries are checked at runtime, so builds never need a live database
//! - Ids are UUID v4 stored as 16-byte BLOBs
//! - Timestamps are Unix milliseconds ([`Timestamp`]) so ordering and
//!   pagination cursors are exact; clients see RFC 3339

pub mod chat;
pub mod images;
pub mod social;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::schema::DatabaseConfig;

/// Open the pool described by `config`.
///
/// An in-memory URL gets exactly one connection that never expires,
/// since every sqlite in-memory connection is its own database.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));

    let pool_options = if config.url.contains(":memory:") {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(config.max_connections)
    };

    pool_options.connect_with(options).await
}

/// Apply embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Fresh migrated in-memory database.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    })
    .await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// True if the database answers a trivial query.
pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Unix milliseconds, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_millis())
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp(dt.timestamp_millis())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_datetime().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}
