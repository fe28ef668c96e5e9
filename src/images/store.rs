//! Object stores the image cache uploads into.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;

use crate::config::StoreConfig;

/// Cached objects never change: the key is derived from the source URL.
const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// Destination for re-hosted images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// Public (CDN) URL for `key`.
    fn public_url(&self, key: &str) -> String;

    /// Base every public URL starts with.
    fn public_base_url(&self) -> &str;

    fn kind(&self) -> &'static str;
}

/// Build the store described by config.
pub fn build_store(config: &StoreConfig) -> Arc<dyn ObjectStore> {
    match config {
        StoreConfig::Local { root, public_base_url } => Arc::new(LocalStore::new(root, public_base_url)),
        StoreConfig::S3 {
            bucket,
            region,
            endpoint,
            access_key,
            secret_key,
            public_base_url,
        } => Arc::new(S3Store::new(
            bucket,
            region,
            endpoint.as_deref(),
            access_key,
            secret_key,
            public_base_url,
        )),
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Relative, no `..`, no empty key.
fn check_key(key: &str) -> Result<&Path, StoreError> {
    let path = Path::new(key);
    let ok = !key.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(path)
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// Files under a directory that a static server or CDN origin exposes.
pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), StoreError> {
        let path = self.root.join(check_key(key)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }

    fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

/// S3-compatible bucket (AWS, Cloudflare R2, MinIO).
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3Store {
    pub fn new(
        bucket: &str,
        region: &str,
        endpoint: Option<&str>,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Self {
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .force_path_style(true);

        if access_key.is_empty() {
            tracing::warn!(bucket = %bucket, "S3 store has no access key configured; uploads will be rejected");
        } else {
            builder = builder.credentials_provider(aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "portal-config",
            ));
        }

        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .cache_control(CACHE_CONTROL)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Upload(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }

    fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    fn kind(&self) -> &'static str {
        "s3"
    }
}
