//! Multi-endpoint fallback HTTP client.
//!
//! # Responsibilities
//! - Try a group's endpoints in priority order, healthy ones first
//! - Bound every attempt with a deadline
//! - Classify failures (timeout, transport, retryable status, block page)
//! - Retry whole rounds with backoff, then report every attempt
//! - Cache successful GET responses
//!
//! # Design Decisions
//! - Unhealthy endpoints are still tried, after all healthy ones
//! - Non-retryable 4xx (e.g. 404) are authoritative and returned as-is
//! - Only 2xx GET responses are cached
//! - Non-idempotent requests (POST, PATCH) move to the next endpoint only when
//!   the previous one was never reached (connection failure, retryable status
//!   or block page). After a timeout or a mid-request transport error the
//!   backend may have applied the request, so the chain stops there.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use reqwest::{header, Method, StatusCode};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{HealthCheckConfig, RetryConfig, UpstreamGroupConfig};
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::timeouts::with_deadline;
use crate::upstream::block::BlockDetector;
use crate::upstream::endpoint::{Endpoint, EndpointStatus};

/// Request forwarded to a group.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path plus optional query, starting with '/'.
    pub path_and_query: String,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl UpstreamRequest {
    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path_and_query: path_and_query.into(),
            accept: None,
            content_type: None,
            body: None,
        }
    }

    /// Whether sending the request twice is harmless.
    fn is_replayable(&self) -> bool {
        self.method.is_idempotent()
    }

    fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }

    fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.path_and_query)
    }
}

/// Response from the endpoint that answered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// Base URL of the endpoint that produced this response.
    pub endpoint: String,
    pub from_cache: bool,
}

/// Why a single attempt was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    /// The connection was never established.
    Connect { message: String },
    Transport { message: String },
    Status { code: u16 },
    Blocked { marker: String },
}

impl FailureReason {
    /// Whether the backend may have received and applied the request.
    pub fn may_have_reached_backend(&self) -> bool {
        matches!(self, FailureReason::Timeout | FailureReason::Transport { .. })
    }

    fn metric_label(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Connect { .. } => "connect",
            FailureReason::Transport { .. } => "transport",
            FailureReason::Status { .. } => "status",
            FailureReason::Blocked { .. } => "blocked",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::Connect { message } => write!(f, "connection failed: {}", message),
            FailureReason::Transport { message } => write!(f, "transport error: {}", message),
            FailureReason::Status { code } => write!(f, "status {}", code),
            FailureReason::Blocked { marker } => write!(f, "block page ({})", marker),
        }
    }
}

/// One failed attempt against one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptFailure {
    pub endpoint: String,
    pub round: u32,
    pub reason: FailureReason,
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unknown upstream group '{0}'")]
    UnknownGroup(String),

    #[error("invalid upstream path '{0}'")]
    InvalidPath(String),

    #[error("upstream group '{group}' has no usable endpoints")]
    NoEndpoints { group: String },

    #[error("all endpoints of '{group}' failed after {} attempts", .attempts.len())]
    Exhausted {
        group: String,
        attempts: Vec<AttemptFailure>,
    },
}

impl UpstreamError {
    /// True when every recorded attempt timed out.
    pub fn all_timeouts(&self) -> bool {
        match self {
            UpstreamError::Exhausted { attempts, .. } => {
                !attempts.is_empty() && attempts.iter().all(|a| a.reason == FailureReason::Timeout)
            }
            _ => false,
        }
    }
}

enum Attempt {
    Done(UpstreamResponse),
    Failed(FailureReason),
}

/// Fallback client for one upstream group.
pub struct FallbackClient {
    name: String,
    endpoints: Vec<Arc<Endpoint>>,
    http: reqwest::Client,
    attempt_timeout: Duration,
    detector: BlockDetector,
    cache: Option<Cache<String, UpstreamResponse>>,
    max_rounds: u32,
    backoff: BackoffPolicy,
    healthy_threshold: usize,
    unhealthy_threshold: usize,
    user_agent: String,
    health_path: Option<String>,
}

impl fmt::Debug for FallbackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackClient")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints.len())
            .field("timeout", &self.attempt_timeout)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl FallbackClient {
    /// Build a client from a validated group config.
    pub fn from_config(
        config: &UpstreamGroupConfig,
        retries: &RetryConfig,
        health: &HealthCheckConfig,
        http: reqwest::Client,
    ) -> Self {
        let mut endpoints: Vec<Arc<Endpoint>> = config
            .endpoints
            .iter()
            .filter_map(|e| match Url::parse(&e.url) {
                Ok(url) => Some(Arc::new(Endpoint::new(url, e.priority))),
                Err(err) => {
                    tracing::warn!(group = %config.name, url = %e.url, error = %err, "Ignoring invalid endpoint");
                    None
                }
            })
            .collect();
        // stable: equal priorities keep config order
        endpoints.sort_by_key(|e| e.priority());

        let cache = (config.cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build()
        });

        Self {
            name: config.name.clone(),
            endpoints,
            http,
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            detector: BlockDetector::new(&config.block_markers, config.expect_json),
            cache,
            max_rounds: retries.max_rounds.max(1),
            backoff: BackoffPolicy::from(retries),
            healthy_threshold: health.healthy_threshold as usize,
            unhealthy_threshold: health.unhealthy_threshold as usize,
            user_agent: config.user_agent.clone(),
            health_path: config.health_path.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    pub fn health_path(&self) -> Option<&str> {
        self.health_path.as_deref()
    }

    pub fn thresholds(&self) -> (usize, usize) {
        (self.healthy_threshold, self.unhealthy_threshold)
    }

    pub fn endpoint_statuses(&self) -> Vec<EndpointStatus> {
        self.endpoints.iter().map(|e| e.snapshot()).collect()
    }

    pub fn cache_entries(&self) -> u64 {
        self.cache.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    /// Healthy endpoints by priority, then unhealthy ones as a last resort.
    fn attempt_order(&self) -> Vec<Arc<Endpoint>> {
        let (healthy, unhealthy): (Vec<_>, Vec<_>) =
            self.endpoints.iter().cloned().partition(|e| e.is_healthy());
        healthy.into_iter().chain(unhealthy).collect()
    }

    /// Execute `request` against the group.
    pub async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        validate_path(&request.path_and_query)?;

        if self.endpoints.is_empty() {
            return Err(UpstreamError::NoEndpoints { group: self.name.clone() });
        }

        let cache_key = request.cache_key();
        if let (Some(cache), true) = (&self.cache, request.is_cacheable()) {
            if let Some(mut hit) = cache.get(&cache_key).await {
                metrics::record_upstream_cache(&self.name, true);
                hit.from_cache = true;
                return Ok(hit);
            }
            metrics::record_upstream_cache(&self.name, false);
        }

        let mut failures = Vec::new();

        for round in 1..=self.max_rounds {
            for endpoint in self.attempt_order() {
                match self.attempt(&endpoint, request).await {
                    Attempt::Done(response) => {
                        endpoint.mark_success(self.healthy_threshold);
                        metrics::record_upstream_attempt(&self.name, "success");

                        if !failures.is_empty() {
                            tracing::info!(
                                group = %self.name,
                                endpoint = %response.endpoint,
                                failed_attempts = failures.len(),
                                "Upstream answered after fallback"
                            );
                        }

                        if let (Some(cache), true) = (&self.cache, request.is_cacheable()) {
                            if response.status.is_success() {
                                cache.insert(cache_key.clone(), response.clone()).await;
                            }
                        }
                        return Ok(response);
                    }
                    Attempt::Failed(reason) => {
                        endpoint.mark_failure(self.unhealthy_threshold);
                        metrics::record_upstream_attempt(&self.name, reason.metric_label());
                        tracing::warn!(
                            group = %self.name,
                            endpoint = %endpoint.base_url(),
                            round,
                            reason = %reason,
                            "Upstream attempt failed, trying next endpoint"
                        );
                        let stop = !request.is_replayable() && reason.may_have_reached_backend();
                        failures.push(AttemptFailure {
                            endpoint: endpoint.base_url().to_string(),
                            round,
                            reason,
                        });
                        if stop {
                            tracing::warn!(
                                group = %self.name,
                                method = %request.method,
                                "Not replaying a non-idempotent request that may have been applied"
                            );
                            return Err(UpstreamError::Exhausted {
                                group: self.name.clone(),
                                attempts: failures,
                            });
                        }
                    }
                }
            }

            if round < self.max_rounds {
                let delay = self.backoff.delay(round);
                tracing::info!(group = %self.name, round, delay = ?delay, "All endpoints failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        Err(UpstreamError::Exhausted {
            group: self.name.clone(),
            attempts: failures,
        })
    }

    async fn attempt(&self, endpoint: &Endpoint, request: &UpstreamRequest) -> Attempt {
        let url = endpoint.join(&request.path_and_query);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(header::USER_AGENT, &self.user_agent);
        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        if let Some(content_type) = &request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        // The deadline covers headers and body.
        let result = with_deadline(self.attempt_timeout, async {
            let response = builder.send().await?;
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, content_type, body))
        })
        .await;

        let (status, content_type, body) = match result {
            Err(_) => return Attempt::Failed(FailureReason::Timeout),
            Ok(Err(e)) if e.is_connect() => {
                return Attempt::Failed(FailureReason::Connect { message: e.to_string() })
            }
            Ok(Err(e)) if e.is_timeout() => return Attempt::Failed(FailureReason::Timeout),
            Ok(Err(e)) => {
                return Attempt::Failed(FailureReason::Transport { message: e.to_string() })
            }
            Ok(Ok(parts)) => parts,
        };

        if let Some(marker) = self.detector.detect(content_type.as_deref(), &body) {
            return Attempt::Failed(FailureReason::Blocked { marker: marker.to_string() });
        }

        if status == StatusCode::FORBIDDEN {
            return Attempt::Failed(FailureReason::Blocked { marker: "403".to_string() });
        }

        if is_retryable_status(status) {
            return Attempt::Failed(FailureReason::Status { code: status.as_u16() });
        }

        Attempt::Done(UpstreamResponse {
            status,
            content_type,
            body,
            endpoint: endpoint.base_url().to_string(),
            from_cache: false,
        })
    }
}

/// Statuses that send the request to the next endpoint.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_EARLY
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Reject paths that could escape the configured base URL.
pub fn validate_path(path_and_query: &str) -> Result<(), UpstreamError> {
    let path = path_and_query.split('?').next().unwrap_or("");
    let invalid = path_and_query.contains("://")
        || path.starts_with("//")
        || path.split('/').any(|segment| segment == ".." || segment.eq_ignore_ascii_case("%2e%2e"));

    if invalid {
        Err(UpstreamError::InvalidPath(path_and_query.to_string()))
    } else {
        Ok(())
    }
}
