//! Connection tracking for long-lived chat sockets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::observability::metrics;

/// Caps concurrent WebSocket connections per user.
pub struct ConnectionTracker {
    counts: Mutex<HashMap<Uuid, usize>>,
    limit: usize,
}

/// Holds one slot; releases it on drop.
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
    user: Uuid,
}

impl ConnectionTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            limit,
        }
    }

    fn counts(&self) -> MutexGuard<'_, HashMap<Uuid, usize>> {
        self.counts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim a slot for `user`, or `None` when the limit is reached.
    pub fn try_acquire(self: &Arc<Self>, user: Uuid) -> Option<ConnectionGuard> {
        let mut counts = self.counts();
        let current = counts.entry(user).or_insert(0);
        if *current >= self.limit {
            return None;
        }
        *current += 1;
        metrics::record_ws_connections(1.0);

        Some(ConnectionGuard {
            tracker: Arc::clone(self),
            user,
        })
    }

    pub fn active(&self, user: Uuid) -> usize {
        self.counts().get(&user).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts().values().sum()
    }

    fn release(&self, user: Uuid) {
        let mut counts = self.counts();
        if let Some(count) = counts.get_mut(&user) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&user);
            }
        }
        metrics::record_ws_connections(-1.0);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release(self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_user() {
        let tracker = Arc::new(ConnectionTracker::new(2));
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let a1 = tracker.try_acquire(alice).unwrap();
        let _a2 = tracker.try_acquire(alice).unwrap();
        assert!(tracker.try_acquire(alice).is_none());
        assert!(tracker.try_acquire(bob).is_some());

        drop(a1);
        assert_eq!(tracker.active(alice), 1);
        assert!(tracker.try_acquire(alice).is_some());
    }

    #[test]
    fn test_guards_release_on_drop() {
        let tracker = Arc::new(ConnectionTracker::new(1));
        let user = Uuid::new_v4();
        {
            let _guard = tracker.try_acquire(user).unwrap();
            assert_eq!(tracker.total(), 1);
        }
        assert_eq!(tracker.total(), 0);
        assert_eq!(tracker.active(user), 0);
    }
}
