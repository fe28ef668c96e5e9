//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Poll each upstream endpoint's health path
//!     → Update endpoint state (upstream::endpoint)
//!
//! Passive health checks:
//!     Every fallback attempt marks success/failure on its endpoint
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - State transitions require consecutive successes/failures
//! - Health state is per-endpoint, not per-group

pub mod active;
