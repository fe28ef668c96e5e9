//! Image re-hosting keyed by a hash of the source URL.
//!
//! # Responsibilities
//! - Deduplicate by SHA-256 of the exact source URL
//! - Fetch once per URL even under concurrent requests
//! - Reject non-images and oversized bodies while streaming
//! - Upload to the object store and record the result
//!
//! # Data Flow
//! ```text
//! url → validate → cached_images lookup ──hit──→ CachedImage { fresh: false }
//!                        │ miss
//!                        ▼
//!              per-hash lock → re-check → fetch (timeout, limits)
//!                        → ObjectStore::put → INSERT OR IGNORE → CachedImage { fresh: true }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::config::ImageConfig;
use crate::db::images::ImageRecord;
use crate::db::Timestamp;
use crate::images::store::{ObjectStore, StoreError};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

#[derive(Debug, Error)]
pub enum ImageCacheError {
    #[error("image cache disabled")]
    Disabled,

    #[error("invalid image url: {0}")]
    InvalidUrl(String),

    #[error("not an image (content-type '{0}')")]
    NotAnImage(String),

    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to fetch image: {0}")]
    Fetch(String),

    #[error("timed out fetching image")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Result returned to API callers.
#[derive(Debug, Clone, Serialize)]
pub struct CachedImage {
    pub hash: String,
    pub source_url: String,
    /// CDN URL to use instead of the source.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    /// True if this call performed the upload.
    pub fresh: bool,
}

impl CachedImage {
    fn from_record(record: ImageRecord, fresh: bool) -> Self {
        Self {
            hash: record.hash,
            source_url: record.source_url,
            url: record.public_url,
            content_type: Some(record.content_type),
            size_bytes: Some(record.size_bytes),
            fresh,
        }
    }
}

/// Lowercase hex SHA-256 of the URL exactly as given.
pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// File extension for an image content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/tiff" => "tiff",
        _ => "bin",
    }
}

fn validate_url(raw: &str) -> Result<Url, ImageCacheError> {
    let url = Url::parse(raw).map_err(|e| ImageCacheError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImageCacheError::InvalidUrl(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ImageCacheError::InvalidUrl("missing host".to_string()));
    }
    Ok(url)
}

pub struct ImageCache {
    db: SqlitePool,
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    config: ImageConfig,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl ImageCache {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, http: reqwest::Client, config: ImageConfig) -> Self {
        Self {
            db,
            store,
            http,
            config,
            inflight: DashMap::new(),
        }
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// Re-host `url` on the object store, or return the existing copy.
    pub async fn cache_image(&self, url: &str) -> Result<CachedImage, ImageCacheError> {
        let parsed = validate_url(url)?;
        let hash = url_hash(url);

        if self.is_hosted(url) {
            return Ok(CachedImage {
                hash,
                source_url: url.to_string(),
                url: url.to_string(),
                content_type: None,
                size_bytes: None,
                fresh: false,
            });
        }

        if let Some(record) = ImageRecord::find(&self.db, &hash).await? {
            metrics::record_image_cache("hit");
            return Ok(CachedImage::from_record(record, false));
        }

        let lock = self
            .inflight
            .entry(hash.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.fetch_and_store(&parsed, url, &hash).await
        };

        drop(lock);
        self.inflight.remove_if(&hash, |_, l| Arc::strong_count(l) == 1);

        if result.is_err() {
            metrics::record_image_cache("error");
        }
        result
    }

    fn is_hosted(&self, url: &str) -> bool {
        let base = self.store.public_base_url();
        !base.is_empty() && url.strip_prefix(base).is_some_and(|rest| rest.starts_with('/'))
    }

    async fn fetch_and_store(&self, parsed: &Url, url: &str, hash: &str) -> Result<CachedImage, ImageCacheError> {
        // Another request may have finished while we waited for the lock.
        if let Some(record) = ImageRecord::find(&self.db, hash).await? {
            metrics::record_image_cache("hit");
            return Ok(CachedImage::from_record(record, false));
        }
        metrics::record_image_cache("miss");

        let deadline = Duration::from_secs(self.config.fetch_timeout_secs);
        let (body, content_type) = with_deadline(deadline, self.download(parsed))
            .await
            .map_err(|_| ImageCacheError::Timeout)??;

        let key = format!("{}{}.{}", self.config.key_prefix, hash, extension_for(&content_type));
        let size = body.len();
        self.store.put(&key, body, &content_type).await?;
        metrics::record_image_upload(size);

        let record = ImageRecord {
            hash: hash.to_string(),
            source_url: url.to_string(),
            public_url: self.store.public_url(&key),
            object_key: key,
            content_type,
            size_bytes: i64::try_from(size).unwrap_or(i64::MAX),
            created_at: Timestamp::now(),
        };
        let stored = ImageRecord::insert_or_get(&self.db, &record).await?;

        tracing::info!(hash = %hash, source = %url, bytes = size, store = self.store.kind(), "Image cached");
        Ok(CachedImage::from_record(stored, true))
    }

    async fn download(&self, url: &Url) -> Result<(Bytes, String), ImageCacheError> {
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, "image/*")
            .send()
            .await
            .map_err(|e| ImageCacheError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageCacheError::Fetch(format!("source answered {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(ImageCacheError::NotAnImage(content_type));
        }

        let limit = self.config.max_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ImageCacheError::TooLarge { limit });
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ImageCacheError::Fetch(e.to_string()))?;
            if body.len() + chunk.len() > limit {
                return Err(ImageCacheError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok((body.freeze(), content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::images::store::LocalStore;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-bytes";

    async fn image_server(hits: Arc<AtomicUsize>) -> SocketAddr {
        let png_hits = hits.clone();
        let app = Router::new()
            .route(
                "/cat.png",
                get(move || {
                    let hits = png_hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        ([(header::CONTENT_TYPE, "image/png")], PNG)
                    }
                }),
            )
            .route("/page.html", get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }))
            .route(
                "/huge.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], vec![0u8; 4096]) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn cache(dir: &tempfile::TempDir, max_bytes: usize) -> ImageCache {
        let db = connect_in_memory().await.unwrap();
        let store = Arc::new(LocalStore::new(dir.path(), "https://cdn.example.com"));
        let config = ImageConfig {
            max_bytes,
            fetch_timeout_secs: 5,
            ..ImageConfig::default()
        };
        ImageCache::new(db, store, reqwest::Client::builder().no_proxy().build().unwrap(), config)
    }

    #[test]
    fn test_url_hash_is_sha256_hex() {
        assert_eq!(
            url_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(url_hash("https://a.com/x.png"), url_hash("https://a.com/x.png?"));
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png; charset=binary"), "png");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("image/x-unknown"), "bin");
    }

    #[tokio::test]
    async fn test_caches_once_then_hits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = image_server(hits.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, 1024).await;
        let url = format!("http://{}/cat.png", addr);

        let first = cache.cache_image(&url).await.unwrap();
        assert!(first.fresh);
        assert_eq!(first.hash, url_hash(&url));
        assert_eq!(first.url, format!("https://cdn.example.com/images/{}.png", first.hash));
        assert_eq!(first.size_bytes, Some(PNG.len() as i64));

        let on_disk = std::fs::read(dir.path().join(format!("images/{}.png", first.hash))).unwrap();
        assert_eq!(on_disk, PNG);

        let second = cache.cache_image(&url).await.unwrap();
        assert!(!second.fresh);
        assert_eq!(second.url, first.url);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_fetch_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = image_server(hits.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(cache(&dir, 1024).await);
        let url = format!("http://{}/cat.png", addr);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                let url = url.clone();
                tokio::spawn(async move { cache.cache_image(&url).await.unwrap() })
            })
            .collect();

        let mut fresh = 0;
        for task in tasks {
            if task.await.unwrap().fresh {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(cache.inflight.is_empty());
    }

    #[tokio::test]
    async fn test_rejections() {
        let addr = image_server(Arc::new(AtomicUsize::new(0))).await;
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, 1024).await;

        let html = cache.cache_image(&format!("http://{}/page.html", addr)).await;
        assert!(matches!(html, Err(ImageCacheError::NotAnImage(ct)) if ct == "text/html"));

        let huge = cache.cache_image(&format!("http://{}/huge.jpg", addr)).await;
        assert!(matches!(huge, Err(ImageCacheError::TooLarge { limit: 1024 })));

        let missing = cache.cache_image(&format!("http://{}/nope.png", addr)).await;
        assert!(matches!(missing, Err(ImageCacheError::Fetch(_))));

        assert!(matches!(cache.cache_image("ftp://x.com/a.png").await, Err(ImageCacheError::InvalidUrl(_))));
        assert!(matches!(cache.cache_image("not a url").await, Err(ImageCacheError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_already_hosted_url_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(&dir, 1024).await;
        let url = "https://cdn.example.com/images/abc.png";

        let result = cache.cache_image(url).await.unwrap();
        assert_eq!(result.url, url);
        assert!(!result.fresh);
    }
}
