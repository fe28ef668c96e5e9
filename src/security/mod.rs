//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-IP token bucket)
//!     → body limit, timeout, concurrency cap (tower layers in http::server)
//!     → handler
//!     → headers.rs (security headers, CORS)
//!
//! Chat socket upgrade:
//!     → qos.rs (per-user connection cap)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Limits are keyed by client IP, or by user for sockets

pub mod headers;
pub mod qos;
pub mod rate_limit;

pub use qos::{ConnectionGuard, ConnectionTracker};
pub use rate_limit::RateLimiterState;
