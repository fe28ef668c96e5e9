//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the portal.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Placeholder secret shipped in the defaults. Startup warns when it is still in use.
pub const DEFAULT_JWT_SECRET: &str = "CHANGE_ME_IN_PRODUCTION_jwt_secret";

/// Root configuration for the portal API.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PortalConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Database connection settings.
    pub database: DatabaseConfig,

    /// Token issuing and password rules.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration for upstream chains.
    pub retries: RetryConfig,

    /// Health check settings for upstream endpoints.
    pub health_check: HealthCheckConfig,

    /// Upstream groups served through the fallback client.
    pub upstreams: Vec<UpstreamGroupConfig>,

    /// Image cache settings.
    pub images: ImageConfig,

    /// Chat limits.
    pub chat: ChatConfig,

    /// Social feed limits.
    pub social: SocialConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL (e.g., "sqlite://portal.db").
    pub url: String,

    /// Pool size.
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://portal.db".to_string(),
            max_connections: 8,
            acquire_timeout_secs: 5,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens.
    pub jwt_secret: String,

    /// Token issuer (`iss` claim).
    pub issuer: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Clock skew tolerated when checking `exp`.
    pub leeway_secs: u64,

    /// Minimum password length in bytes.
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            issuer: "portal-api".to_string(),
            token_ttl_secs: 7 * 24 * 3600,
            leeway_secs: 0,
            min_password_len: 8,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Grace period for draining in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per client.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Use the first `X-Forwarded-For` hop as client key.
    pub trust_forwarded_for: bool,

    /// Buckets idle longer than this are dropped by the sweeper.
    pub idle_bucket_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 20,
            burst_size: 40,
            trust_forwarded_for: false,
            idle_bucket_secs: 300,
        }
    }
}

/// Retry configuration for whole upstream chains.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of passes over the endpoint list (1 = no retry).
    pub max_rounds: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_rounds: 1,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// A named group of interchangeable upstream endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamGroupConfig {
    /// Group identifier used in `/api/upstream/{name}/...`.
    pub name: String,

    /// Candidate base URLs.
    pub endpoints: Vec<EndpointConfig>,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,

    /// Response cache TTL in seconds (0 disables caching).
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// Maximum cached responses for this group.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Treat non-JSON bodies that contain a block marker as blocked.
    #[serde(default)]
    pub expect_json: bool,

    /// Path polled by the active health monitor. Unset disables polling.
    #[serde(default)]
    pub health_path: Option<String>,

    /// User-Agent sent upstream.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Case-insensitive substrings identifying a block/challenge page.
    #[serde(default = "default_block_markers")]
    pub block_markers: Vec<String>,
}

/// One upstream base URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Base URL, path included (e.g., "https://api.example.com/v4").
    pub url: String,

    /// Lower is tried first.
    #[serde(default)]
    pub priority: u32,
}

fn default_upstream_timeout_ms() -> u64 {
    8000
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_user_agent() -> String {
    format!("portal-api/{}", env!("CARGO_PKG_VERSION"))
}

pub fn default_block_markers() -> Vec<String> {
    [
        "cf-browser-verification",
        "challenge-platform",
        "just a moment...",
        "attention required! | cloudflare",
        "ddos-guard",
        "captcha",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Image cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Enable the image cache routes.
    pub enabled: bool,

    /// Largest image accepted, in bytes.
    pub max_bytes: usize,

    /// Timeout for fetching the source image.
    pub fetch_timeout_secs: u64,

    /// Prefix prepended to every object key.
    pub key_prefix: String,

    /// Where cached images are stored.
    pub store: StoreConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 10 * 1024 * 1024,
            fetch_timeout_secs: 15,
            key_prefix: "images/".to_string(),
            store: StoreConfig::default(),
        }
    }
}

/// Object store backing the image cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Files on local disk served by a CDN or static file server.
    Local {
        root: String,
        public_base_url: String,
    },
    /// S3-compatible bucket (AWS, R2, MinIO, ...).
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key: String,
        #[serde(default)]
        secret_key: String,
        public_base_url: String,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            root: "./cdn".to_string(),
            public_base_url: "http://localhost:8080/cdn".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn public_base_url(&self) -> &str {
        match self {
            StoreConfig::Local { public_base_url, .. } => public_base_url,
            StoreConfig::S3 { public_base_url, .. } => public_base_url,
        }
    }
}

/// Chat configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum message length in characters.
    pub max_message_len: usize,

    /// Default page size for message history.
    pub history_limit: i64,

    /// Concurrent WebSocket connections allowed per user.
    pub max_ws_connections_per_user: usize,

    /// Broadcast buffer per room.
    pub broadcast_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_len: 2000,
            history_limit: 50,
            max_ws_connections_per_user: 5,
            broadcast_capacity: 256,
        }
    }
}

/// Social feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocialConfig {
    pub max_post_len: usize,
    pub max_comment_len: usize,
    pub page_size: i64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            max_post_len: 5000,
            max_comment_len: 1000,
            page_size: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security headers.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Origins allowed by CORS. Empty disables the CORS layer.
    pub cors_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}
