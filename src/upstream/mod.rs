//! Upstream fallback subsystem.
//!
//! # Data Flow
//! ```text
//! /api/upstream/{group}/{path}
//!     → registry.rs (group name → FallbackClient)
//!     → client.rs (cache lookup, ordered attempts)
//!         → endpoint.rs (priority + health state)
//!         → block.rs (challenge page detection)
//!     → first acceptable response, or Exhausted with every attempt
//! ```
//!
//! # Design Decisions
//! - Sequential attempts, never parallel fan-out (upstreams are rate limited)
//! - Health is tracked passively on every attempt and optionally checked actively
//! - Registry swaps atomically on config reload

pub mod block;
pub mod client;
pub mod endpoint;
pub mod registry;

pub use client::{FallbackClient, UpstreamError, UpstreamRequest, UpstreamResponse};
pub use registry::UpstreamRegistry;
