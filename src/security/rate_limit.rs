//! Per-client token-bucket rate limiting.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::http::response::error_response;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state: one bucket per client IP.
pub struct RateLimiterState {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    rps: f64,
    burst: f64,
    trust_forwarded_for: bool,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            rps: f64::from(config.requests_per_second),
            burst: f64::from(config.burst_size.max(1)),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<IpAddr, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take one token for `client`.
    pub fn check(&self, client: IpAddr) -> bool {
        let mut buckets = self.buckets();
        let bucket = buckets
            .entry(client)
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Drop buckets untouched for `idle`. Returns how many were removed.
    pub fn sweep(&self, idle: Duration) -> usize {
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.last_update.elapsed() < idle);
        before - buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets().len()
    }
}

/// Client address: first `X-Forwarded-For` hop when trusted, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    peer.map(|addr| addr.ip())
}

/// Rejects with 429 once a client's bucket is empty.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    // Without a peer address (in-process calls) there is nothing to key on.
    let Some(client) = client_ip(request.headers(), peer, state.trust_forwarded_for) else {
        return next.run(request).await;
    };

    if state.check(client) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, "Rate limit exceeded");
        metrics::record_rate_limited();
        error_response(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }
}

/// Periodically evict idle buckets until shutdown.
pub async fn run_sweeper(state: Arc<RateLimiterState>, idle: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(idle.max(Duration::from_secs(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = state.sweep(idle);
                if removed > 0 {
                    tracing::debug!(removed, remaining = state.tracked_clients(), "Swept idle rate-limit buckets");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
