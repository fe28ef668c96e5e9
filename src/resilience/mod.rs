//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream attempt:
//!     → timeouts.rs (per-attempt deadline)
//!     → on chain exhaustion: backoff.rs (delay before the next round)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Jittered backoff prevents thundering herd across rounds

pub mod backoff;
pub mod timeouts;
