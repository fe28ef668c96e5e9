//! Configuration loading from disk.

use std::path::Path;
use std::fs;

use thiserror::Error;

use crate::config::schema::{PortalConfig, StoreConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PortalConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse, apply environment overrides, and validate.
pub fn parse_config(content: &str) -> Result<PortalConfig, ConfigError> {
    let mut config: PortalConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay secrets and deployment-specific values from the environment.
///
/// `lookup` is injected so tests do not have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut PortalConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PORTAL_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("PORTAL_DATABASE_URL") {
        config.database.url = v;
    }
    if let Some(v) = lookup("PORTAL_JWT_SECRET") {
        config.auth.jwt_secret = v;
    }
    if let Some(v) = lookup("PORTAL_ADMIN_API_KEY") {
        config.admin.api_key = v;
    }
    if let StoreConfig::S3 { access_key, secret_key, .. } = &mut config.images.store {
        if let Some(v) = lookup("PORTAL_S3_ACCESS_KEY") {
            *access_key = v;
        }
        if let Some(v) = lookup("PORTAL_S3_SECRET_KEY") {
            *secret_key = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORTAL_JWT_SECRET", "0123456789abcdef0123"),
            ("PORTAL_DATABASE_URL", "sqlite::memory:"),
        ]
        .into_iter()
        .collect();

        let mut config = PortalConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.auth.jwt_secret, "0123456789abcdef0123");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_config("listener = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/portal.toml")).unwrap_err();
        assert!(err.to_string().starts_with("IO error"));
    }
}
