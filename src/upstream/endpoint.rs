//! A single upstream base URL and its health state.
//!
//! # Responsibilities
//! - Hold the parsed base URL and priority
//! - Track health with hysteresis (consecutive failures/successes)
//! - Join request paths onto the base without losing its path prefix

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use url::Url;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// One candidate endpoint inside an upstream group.
#[derive(Debug)]
pub struct Endpoint {
    base_url: Url,
    priority: u32,
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
}

impl Endpoint {
    pub fn new(base_url: Url, priority: u32) -> Self {
        Self {
            base_url,
            priority,
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or not yet checked.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    /// Build the full URL for `path_and_query` (which starts with '/').
    ///
    /// `https://api.example.com/v4` + `/anime/1?x=1` gives
    /// `https://api.example.com/v4/anime/1?x=1`.
    pub fn join(&self, path_and_query: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        if path_and_query.is_empty() {
            base.to_string()
        } else if path_and_query.starts_with('/') || path_and_query.starts_with('?') {
            format!("{}{}", base, path_and_query)
        } else {
            format!("{}/{}", base, path_and_query)
        }
    }

    /// Report a successful attempt or health check.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold.max(1) {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            self.consecutive_successes.store(0, Ordering::Relaxed);
            tracing::info!(endpoint = %self.base_url, "Upstream endpoint marked healthy");
        }
    }

    /// Report a failed attempt or health check.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.state() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold.max(1) {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
            tracing::warn!(endpoint = %self.base_url, failures, "Upstream endpoint marked unhealthy");
        }
    }

    pub fn snapshot(&self) -> EndpointStatus {
        EndpointStatus {
            url: self.base_url.to_string(),
            priority: self.priority,
            state: self.state(),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
        }
    }
}

/// Serializable view used by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub url: String,
    pub priority: u32,
    pub state: HealthState,
    pub total_successes: u64,
    pub total_failures: u64,
}
