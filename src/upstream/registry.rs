//! Group name → fallback client map, swappable on config reload.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::PortalConfig;
use crate::upstream::client::{FallbackClient, UpstreamError};
use crate::upstream::endpoint::EndpointStatus;

type Groups = HashMap<String, Arc<FallbackClient>>;

/// Live set of upstream groups.
pub struct UpstreamRegistry {
    groups: ArcSwap<Groups>,
    http: reqwest::Client,
}

/// Admin view of one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub name: String,
    pub cache_entries: u64,
    pub endpoints: Vec<EndpointStatus>,
}

impl UpstreamRegistry {
    /// Build every group from config, sharing one connection pool.
    pub fn from_config(config: &PortalConfig, http: reqwest::Client) -> Self {
        let groups = build_groups(config, &http);
        Self {
            groups: ArcSwap::from_pointee(groups),
            http,
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<FallbackClient>, UpstreamError> {
        self.groups
            .load()
            .get(name)
            .cloned()
            .ok_or_else(|| UpstreamError::UnknownGroup(name.to_string()))
    }

    /// All current clients, sorted by name.
    pub fn clients(&self) -> Vec<Arc<FallbackClient>> {
        let mut clients: Vec<_> = self.groups.load().values().cloned().collect();
        clients.sort_by(|a, b| a.name().cmp(b.name()));
        clients
    }

    /// Replace every group. Health state and caches start fresh.
    pub fn reload(&self, config: &PortalConfig) {
        let groups = build_groups(config, &self.http);
        let names: Vec<_> = groups.keys().cloned().collect();
        self.groups.store(Arc::new(groups));
        tracing::info!(groups = ?names, "Upstream registry reloaded");
    }

    pub fn statuses(&self) -> Vec<GroupStatus> {
        self.clients()
            .iter()
            .map(|c| GroupStatus {
                name: c.name().to_string(),
                cache_entries: c.cache_entries(),
                endpoints: c.endpoint_statuses(),
            })
            .collect()
    }

    pub fn clear_caches(&self) {
        for client in self.clients() {
            client.clear_cache();
        }
    }
}

fn build_groups(config: &PortalConfig, http: &reqwest::Client) -> Groups {
    config
        .upstreams
        .iter()
        .map(|group| {
            let client = FallbackClient::from_config(
                group,
                &config.retries,
                &config.health_check,
                http.clone(),
            );
            (group.name.clone(), Arc::new(client))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(names: &[&str]) -> PortalConfig {
        let mut toml_src = String::new();
        for name in names {
            toml_src.push_str(&format!(
                "[[upstreams]]\nname = \"{}\"\nendpoints = [{{ url = \"http://127.0.0.1:1\" }}]\n",
                name
            ));
        }
        toml::from_str(&toml_src).unwrap()
    }

    #[test]
    fn test_lookup_and_reload() {
        let registry = UpstreamRegistry::from_config(&config_with(&["anime"]), reqwest::Client::new());
        assert!(registry.get("anime").is_ok());
        assert!(matches!(registry.get("manga"), Err(UpstreamError::UnknownGroup(_))));

        registry.reload(&config_with(&["manga", "anime"]));
        let names: Vec<_> = registry.clients().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["anime", "manga"]);
    }
}
