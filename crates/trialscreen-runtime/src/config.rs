//! Configuration for the explanation runtime.
//!
//! ```yaml
//! model: gemini-2.5-flash
//! temperature: 0.2
//! timeout: 15s
//! max_retries: 2
//! retry_min_delay: 200ms
//! circuit_breaker:
//!   failure_threshold: 3
//!   recovery_timeout: 30s
//! cache:
//!   max_entries: 1000
//!   ttl: 1h
//! fallback: rule_based
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::{CircuitBreakerConfig, FallbackStrategy};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Serde adapter for durations written as "15s", "200ms", "1h".
pub(crate) mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: u64,

    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration for the [`ExplanationService`](crate::ExplanationService).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    /// Model name passed to the provider
    pub model: String,

    /// Maximum tokens per explanation
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Per-attempt timeout
    #[serde(with = "human_duration")]
    pub timeout: Duration,

    /// Retries after the first attempt, transient errors only
    pub max_retries: usize,

    /// First backoff delay; doubles per retry
    #[serde(with = "human_duration")]
    pub retry_min_delay: Duration,

    pub circuit_breaker: CircuitBreakerConfig,

    pub cache: CacheConfig,

    pub fallback: FallbackStrategy,
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_min_delay: Duration::from_millis(200),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            fallback: FallbackStrategy::default(),
        }
    }
}

impl ExplanationConfig {
    /// Create a config for the given model with defaults elsewhere.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                reason: "must not be empty".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "temperature",
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "circuit_breaker.failure_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Per-call settings handed to the provider.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            json_response: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExplanationConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.fallback, FallbackStrategy::Unavailable);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_human_durations() {
        let yaml = r#"
model: "local-llm"
timeout: 5s
retry_min_delay: 50ms
circuit_breaker:
  failure_threshold: 5
  recovery_timeout: 2m
cache:
  ttl: 10m
fallback: rule_based
"#;
        let config = ExplanationConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.model, "local-llm");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry_min_delay, Duration::from_millis(50));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert!(config.cache.enabled);
        assert_eq!(config.fallback, FallbackStrategy::RuleBased);
    }

    #[test]
    fn test_bad_duration_rejected() {
        let result = ExplanationConfig::from_yaml("timeout: soon");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = ExplanationConfig::from_json(r#"{"timeout": "0s"}"#);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "timeout", .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ExplanationConfig::new("gemini-2.5-pro");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"timeout\":\"15s\""));
        assert_eq!(ExplanationConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_demo_config_loads() {
        let config = ExplanationConfig::from_yaml(include_str!("../../../demos/explain.yaml")).unwrap();
        assert_eq!(config.fallback, FallbackStrategy::RuleBased);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.circuit_breaker.success_threshold, 1);
        assert!(config.validate().is_ok());
    }
}
