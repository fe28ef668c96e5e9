//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + environment
//!     → loader.rs (parse, env overrides)
//!     → validation.rs (semantic checks)
//!     → PortalConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs parses the new file
//!     → validation.rs validates
//!     → server swaps the upstream registry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only upstream groups hot-reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::PortalConfig;
pub use schema::{
    AdminConfig, AuthConfig, ChatConfig, EndpointConfig, HealthCheckConfig, ImageConfig,
    ListenerConfig, RateLimitConfig, RetryConfig, SocialConfig, StoreConfig,
    UpstreamGroupConfig,
};
