//! Records of images already re-hosted on the object store.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::db::Timestamp;

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct ImageRecord {
    /// Hex SHA-256 of `source_url`.
    pub hash: String,
    pub source_url: String,
    pub object_key: String,
    pub public_url: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: Timestamp,
}

/// Aggregate for the admin API.
#[derive(Debug, Clone, Copy, FromRow, Serialize)]
pub struct ImageStats {
    pub count: i64,
    pub total_bytes: i64,
}

impl ImageRecord {
    pub async fn find(pool: &SqlitePool, hash: &str) -> Result<Option<ImageRecord>, sqlx::Error> {
        sqlx::query_as::<_, ImageRecord>(
            "SELECT hash, source_url, object_key, public_url, content_type, size_bytes, created_at
             FROM cached_images WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(pool)
        .await
    }

    /// Insert unless a record for the hash already exists, then return the stored row.
    pub async fn insert_or_get(pool: &SqlitePool, record: &ImageRecord) -> Result<ImageRecord, sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO cached_images
                (hash, source_url, object_key, public_url, content_type, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.hash)
        .bind(&record.source_url)
        .bind(&record.object_key)
        .bind(&record.public_url)
        .bind(&record.content_type)
        .bind(record.size_bytes)
        .bind(record.created_at)
        .execute(pool)
        .await?;

        Self::find(pool, &record.hash)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn stats(pool: &SqlitePool) -> Result<ImageStats, sqlx::Error> {
        sqlx::query_as::<_, ImageStats>(
            "SELECT COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS total_bytes FROM cached_images",
        )
        .fetch_one(pool)
        .await
    }
}
