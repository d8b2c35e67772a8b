//! Configuration management for crpt-gate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};
use crate::ratelimit::TimeUnit;

/// Prefix of environment variables that override file settings,
/// e.g. `CRPT__CLIENT__BASE_URL`.
const ENV_PREFIX: &str = "CRPT";

/// Main configuration for the submission client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrptConfig {
    /// Remote API configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the document API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token attached to every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://ismp.crpt.ru".to_string()
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    60
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the sliding window
    #[serde(default)]
    pub unit: TimeUnit,

    /// Maximum submissions per window
    #[serde(default = "default_request_limit")]
    pub request_limit: usize,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            unit: TimeUnit::default(),
            request_limit: default_request_limit(),
        }
    }
}

fn default_request_limit() -> usize {
    5
}

impl CrptConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file, then apply `CRPT__`
    /// environment overrides.
    ///
    /// The file format follows its extension (YAML, TOML or JSON).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrptConfig::default();

        assert_eq!(config.client.base_url, "https://ismp.crpt.ru");
        assert_eq!(config.client.auth_token, None);
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(20));
        assert_eq!(config.client.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.unit, TimeUnit::Second);
        assert_eq!(config.rate_limiting.request_limit, 5);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
client:
  base_url: "https://markirovka.example"
  auth_token: "secret"
rate_limiting:
  unit: minute
"#;

        let config = CrptConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.client.base_url, "https://markirovka.example");
        assert_eq!(config.client.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.client.request_timeout_secs, 60);
        assert_eq!(config.rate_limiting.unit, TimeUnit::Minute);
        assert_eq!(config.rate_limiting.request_limit, 5);
    }

    #[test]
    fn test_from_yaml_rejects_unknown_unit() {
        let yaml = "rate_limiting:\n  unit: fortnight\n";
        let result = CrptConfig::from_yaml(yaml);
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = CrptConfig::from_file("/nonexistent/crpt-gate.yaml");
        assert!(matches!(result, Err(GateError::Io(_))));
    }

    #[test]
    fn test_load_applies_environment_overrides() {
        std::env::set_var("CRPT__CLIENT__AUTH_TOKEN", "env-token");
        std::env::set_var("CRPT__CLIENT__CONNECT_TIMEOUT_SECS", "7");

        let config = CrptConfig::load(None);

        std::env::remove_var("CRPT__CLIENT__AUTH_TOKEN");
        std::env::remove_var("CRPT__CLIENT__CONNECT_TIMEOUT_SECS");
        let config = config.unwrap();

        assert_eq!(config.client.auth_token.as_deref(), Some("env-token"));
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(7));
        assert_eq!(config.client.base_url, "https://ismp.crpt.ru");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("crpt-gate-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "client:\n  base_url: \"https://file.example\"\nrate_limiting:\n  unit: hour\n  request_limit: 100\n",
        )
        .unwrap();

        let config = CrptConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();
        let config = config.unwrap();

        assert_eq!(config.client.base_url, "https://file.example");
        assert_eq!(config.rate_limiting.unit, TimeUnit::Hour);
        assert_eq!(config.rate_limiting.request_limit, 100);
    }
}
