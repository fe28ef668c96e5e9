//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, secrets long enough)
//! - Check upstream groups are unique and their endpoints parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PortalConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{PortalConfig, StoreConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret must be at least 16 bytes")]
    WeakJwtSecret,

    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("duplicate upstream group '{0}'")]
    DuplicateGroup(String),

    #[error("upstream group '{0}' has no endpoints")]
    EmptyGroup(String),

    #[error("upstream group '{group}' has invalid endpoint url '{url}'")]
    InvalidEndpoint { group: String, url: String },

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,

    #[error("images.store: {0}")]
    InvalidStore(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &PortalConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.auth.jwt_secret.len() < 16 {
        errors.push(ValidationError::WeakJwtSecret);
    }

    let positive = [
        ("auth.token_ttl_secs", config.auth.token_ttl_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("retries.max_rounds", config.retries.max_rounds as u64),
        ("images.fetch_timeout_secs", config.images.fetch_timeout_secs),
        ("images.max_bytes", config.images.max_bytes as u64),
        ("listener.max_connections", config.listener.max_connections as u64),
        ("chat.broadcast_capacity", config.chat.broadcast_capacity as u64),
        ("chat.max_ws_connections_per_user", config.chat.max_ws_connections_per_user as u64),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive {
                field: field.to_string(),
            });
        }
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::NotPositive {
            field: "rate_limit.requests_per_second".to_string(),
        });
    }

    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::NotPositive {
            field: "health_check.interval_secs".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for group in &config.upstreams {
        if !seen.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.name.clone()));
        }
        if group.endpoints.is_empty() {
            errors.push(ValidationError::EmptyGroup(group.name.clone()));
        }
        if group.timeout_ms == 0 {
            errors.push(ValidationError::NotPositive {
                field: format!("upstreams.{}.timeout_ms", group.name),
            });
        }
        for endpoint in &group.endpoints {
            if !is_http_url(&endpoint.url) {
                errors.push(ValidationError::InvalidEndpoint {
                    group: group.name.clone(),
                    url: endpoint.url.clone(),
                });
            }
        }
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if !is_http_url(config.images.store.public_base_url()) {
        errors.push(ValidationError::InvalidStore(
            "public_base_url must be an http(s) url".to_string(),
        ));
    }
    match &config.images.store {
        StoreConfig::Local { root, .. } if root.trim().is_empty() => {
            errors.push(ValidationError::InvalidStore("local root is empty".to_string()));
        }
        StoreConfig::S3 { bucket, .. } if bucket.trim().is_empty() => {
            errors.push(ValidationError::InvalidStore("s3 bucket is empty".to_string()));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
