//! Provider configuration.
//!
//! Settings arrive as a JSON object, are checked against [`ProviderConfig::schema`],
//! and fall back to `GRAFANA_*` environment variables for anything left unset.
//! Each API surface is optional: a resource kind is only registered when the
//! credentials it needs are present.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::readiness::{ReadinessConfig, DEFAULT_TIMEOUT};
use crate::schema::{Attribute, Schema, Validator};
use crate::validation::{summarize, validate_result};

/// Grafana Cloud API used when `cloud_api_url` is not set.
pub const DEFAULT_CLOUD_API_URL: &str = "https://grafana.com/";

/// OnCall API used when `oncall_url` is not set.
pub const DEFAULT_ONCALL_URL: &str = "https://oncall-prod-us-central-0.grafana.net/oncall/";

/// Longest accepted `readiness_timeout_secs`: one day.
pub const MAX_READINESS_TIMEOUT_SECS: u64 = 24 * 60 * 60;

fn default_readiness_wait() -> bool {
    true
}

fn default_readiness_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Credentials and endpoints for the Grafana APIs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Root URL of a Grafana instance.
    #[serde(default)]
    pub url: Option<String>,
    /// API token or `user:password` for the Grafana instance.
    #[serde(default)]
    pub auth: Option<String>,
    /// Grafana Cloud API key.
    #[serde(default)]
    pub cloud_api_key: Option<String>,
    /// Grafana Cloud API URL.
    #[serde(default)]
    pub cloud_api_url: Option<String>,
    /// Grafana OnCall access token.
    #[serde(default)]
    pub oncall_access_token: Option<String>,
    /// Grafana OnCall API URL.
    #[serde(default)]
    pub oncall_url: Option<String>,
    /// Wait for resources to become reachable after create and update.
    #[serde(default = "default_readiness_wait")]
    pub readiness_wait: bool,
    /// Deadline for each readiness wait.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: None,
            auth: None,
            cloud_api_key: None,
            cloud_api_url: None,
            oncall_access_token: None,
            oncall_url: None,
            readiness_wait: default_readiness_wait(),
            readiness_timeout_secs: default_readiness_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(secret: &Option<String>) -> Option<&'static str> {
            secret.as_ref().map(|_| "<redacted>")
        }
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("auth", &redact(&self.auth))
            .field("cloud_api_key", &redact(&self.cloud_api_key))
            .field("cloud_api_url", &self.cloud_api_url)
            .field("oncall_access_token", &redact(&self.oncall_access_token))
            .field("oncall_url", &self.oncall_url)
            .field("readiness_wait", &self.readiness_wait)
            .field("readiness_timeout_secs", &self.readiness_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Grafana provider configuration.")
            .with_attribute(
                "url",
                Attribute::optional_string()
                    .with_description("The root URL of a Grafana server. May also be set with GRAFANA_URL.")
                    .with_validator(Validator::NotEmpty),
            )
            .with_attribute(
                "auth",
                Attribute::optional_string()
                    .with_description("API token or basic auth username:password. May also be set with GRAFANA_AUTH.")
                    .sensitive(),
            )
            .with_attribute(
                "cloud_api_key",
                Attribute::optional_string()
                    .with_description("API key for Grafana Cloud. May also be set with GRAFANA_CLOUD_API_KEY.")
                    .sensitive(),
            )
            .with_attribute(
                "cloud_api_url",
                Attribute::optional_string()
                    .with_description("Grafana Cloud's API URL. May also be set with GRAFANA_CLOUD_API_URL."),
            )
            .with_attribute(
                "oncall_access_token",
                Attribute::optional_string()
                    .with_description("A Grafana OnCall access token. May also be set with GRAFANA_ONCALL_ACCESS_TOKEN.")
                    .sensitive(),
            )
            .with_attribute(
                "oncall_url",
                Attribute::optional_string()
                    .with_description("A Grafana OnCall backend address. May also be set with GRAFANA_ONCALL_URL."),
            )
            .with_attribute(
                "readiness_wait",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Wait for created and updated resources to become reachable."),
            )
            .with_attribute(
                "readiness_timeout_secs",
                Attribute::optional_int64()
                    .with_default(json!(DEFAULT_TIMEOUT.as_secs()))
                    .with_description("How long to wait for readiness, in seconds."),
            )
    }

    /// Decode configuration from a JSON object.
    ///
    /// Cross-field rules are left to [`check`](Self::check), since environment
    /// fallbacks may still fill in missing settings.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        let schema = Self::schema();
        validate_result(&schema, value)
            .map_err(|diagnostics| ProviderError::Configuration(summarize(&diagnostics)))?;

        let mut object = value.as_object().cloned().unwrap_or_default();
        schema.block.apply_defaults(&mut object);
        let config: Self = serde_json::from_value(Value::Object(object))
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;
        Ok(config)
    }

    /// Fill unset fields from the process environment.
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback(|name| std::env::var(name).ok())
    }

    /// Fill unset fields from `lookup`, keyed by environment variable name.
    pub fn with_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slots = [
            (&mut self.url, "GRAFANA_URL"),
            (&mut self.auth, "GRAFANA_AUTH"),
            (&mut self.cloud_api_key, "GRAFANA_CLOUD_API_KEY"),
            (&mut self.cloud_api_url, "GRAFANA_CLOUD_API_URL"),
            (&mut self.oncall_access_token, "GRAFANA_ONCALL_ACCESS_TOKEN"),
            (&mut self.oncall_url, "GRAFANA_ONCALL_URL"),
        ];
        for (slot, name) in slots {
            if slot.is_none() {
                *slot = lookup(name).filter(|v| !v.is_empty());
            }
        }
        self
    }

    /// Check settings that depend on each other.
    pub fn check(&self) -> Result<(), ProviderError> {
        if self.url.is_some() != self.auth.is_some() {
            return Err(ProviderError::Configuration(
                "url and auth must be set together".to_string(),
            ));
        }
        if self.readiness_timeout_secs == 0 {
            return Err(ProviderError::Configuration(
                "readiness_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.readiness_timeout_secs > MAX_READINESS_TIMEOUT_SECS {
            return Err(ProviderError::Configuration(format!(
                "readiness_timeout_secs must be at most {}",
                MAX_READINESS_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    /// Cloud API base URL.
    pub fn cloud_api_url(&self) -> &str {
        self.cloud_api_url.as_deref().unwrap_or(DEFAULT_CLOUD_API_URL)
    }

    /// OnCall API base URL.
    pub fn oncall_url(&self) -> &str {
        self.oncall_url.as_deref().unwrap_or(DEFAULT_ONCALL_URL)
    }

    /// Readiness timing, or `None` when waiting is disabled.
    pub fn readiness(&self) -> Option<ReadinessConfig> {
        self.readiness_wait.then(|| {
            ReadinessConfig::default().with_timeout(Duration::from_secs(self.readiness_timeout_secs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::from_value(&json!({})).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert!(config.readiness_wait);
        assert_eq!(config.readiness().map(|r| r.timeout), Some(DEFAULT_TIMEOUT));
        assert_eq!(config.cloud_api_url(), DEFAULT_CLOUD_API_URL);
    }

    #[test]
    fn test_invalid_settings_are_reported() {
        let err = ProviderConfig::from_value(&json!({"readiness_wait": "yes"})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(ref msg) if msg.contains("readiness_wait")));

        let err = ProviderConfig::from_value(&json!({"grafana_url": "x"})).unwrap_err();
        assert!(err.to_string().contains("Unsupported attribute"));

        let config = ProviderConfig::from_value(&json!({"url": "https://grafana.example.com"}))
            .unwrap();
        assert!(config.check().unwrap_err().to_string().contains("url and auth"));

        let config = ProviderConfig::from_value(&json!({"readiness_timeout_secs": 0})).unwrap();
        assert!(config.check().unwrap_err().to_string().contains("greater than zero"));

        assert!(ProviderConfig::from_value(&json!({"readiness_timeout_secs": -5})).is_err());

        let config =
            ProviderConfig::from_value(&json!({"readiness_timeout_secs": i64::MAX})).unwrap();
        assert!(config.check().unwrap_err().to_string().contains("at most 86400"));
        let config = ProviderConfig::from_value(
            &json!({"readiness_timeout_secs": MAX_READINESS_TIMEOUT_SECS}),
        )
        .unwrap();
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_env_fallback_fills_only_unset_fields() {
        let env: HashMap<&str, &str> = [
            ("GRAFANA_URL", "https://env.example.com"),
            ("GRAFANA_AUTH", "admin:admin"),
            ("GRAFANA_CLOUD_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let config = ProviderConfig {
            url: Some("https://config.example.com".to_string()),
            ..Default::default()
        }
        .with_fallback(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.url.as_deref(), Some("https://config.example.com"));
        assert_eq!(config.auth.as_deref(), Some("admin:admin"));
        assert_eq!(config.cloud_api_key, None);
    }

    #[test]
    fn test_readiness_disabled() {
        let config = ProviderConfig::from_value(&json!({"readiness_wait": false})).unwrap();
        assert_eq!(config.readiness(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ProviderConfig {
            auth: Some("admin:hunter2".to_string()),
            cloud_api_key: Some("glc_secret".to_string()),
            ..Default::default()
        };
        let shown = format!("{:?}", config);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("glc_secret"));
        assert!(shown.contains("<redacted>"));
    }
}
