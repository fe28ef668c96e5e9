//! Timeout enforcement for outbound calls.
//!
//! Timed-out work is dropped (cancelled) by `tokio::time::timeout`; callers
//! receive [`Elapsed`] distinct from the inner error.

use std::future::Future;
use std::time::Duration;

/// The deadline passed before the future completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct Elapsed(pub Duration);

/// Run `fut` with a deadline, flattening the two error layers.
pub async fn with_deadline<T, E, F>(deadline: Duration, fut: F) -> Result<Result<T, E>, Elapsed>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Elapsed(deadline))
}
