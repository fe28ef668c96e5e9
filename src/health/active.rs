//! Active health checking of upstream endpoints.
//!
//! # Responsibilities
//! - Periodically poll endpoints of groups that set `health_path`
//! - Update endpoint health state based on results

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio::sync::broadcast;
use crate::config::HealthCheckConfig;
use crate::observability::metrics;
use crate::upstream::UpstreamRegistry;

pub struct HealthMonitor {
    registry: Arc<UpstreamRegistry>,
    config: HealthCheckConfig,
    client: reqwest::Client,
}

impl HealthMonitor {
    pub fn new(registry: Arc<UpstreamRegistry>, config: HealthCheckConfig, client: reqwest::Client) -> Self {
        Self { registry, config, client }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check every endpoint once. Groups without a health path are skipped.
    pub async fn check_all(&self) {
        let timeout = Duration::from_secs(self.config.timeout_secs);

        for group in self.registry.clients() {
            let Some(path) = group.health_path() else {
                continue;
            };
            let (healthy_threshold, unhealthy_threshold) = group.thresholds();

            for endpoint in group.endpoints() {
                let url = endpoint.join(path);

                let healthy = match time::timeout(timeout, self.client.get(&url).send()).await {
                    Ok(Ok(response)) => {
                        let success = response.status().is_success();
                        if !success {
                            tracing::warn!(url = %url, status = %response.status(), "Health check failed: non-success status");
                        }
                        success
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "Health check failed: connection error");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(url = %url, "Health check failed: timeout");
                        false
                    }
                };

                if healthy {
                    endpoint.mark_success(healthy_threshold);
                } else {
                    endpoint.mark_failure(unhealthy_threshold);
                }

                metrics::record_endpoint_health(endpoint.base_url().as_str(), endpoint.is_healthy());
            }
        }
    }
}
