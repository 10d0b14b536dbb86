//! Runtime configuration.
//!
//! Loaded from YAML. Every section is optional:
//!
//! ```yaml
//! provider:
//!   type: gemini
//!   options:
//!     base_url: https://generativelanguage.googleapis.com/v1beta
//! retry:
//!   max_attempts_per_model: 3
//!   base_delay: 1s
//!   max_delay: 8s
//! models:
//!   text: [gemini-2.5-flash, gemini-2.0-flash]
//!   image: [gemini-2.5-flash-image]
//! request_timeout: 60s
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use genrelay_core::{Capability, RetryPolicy, SpecError};

use crate::providers::{GenerativeProvider, ProviderError, ProviderRegistry};

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid retry settings: {0}")]
    InvalidRetry(#[from] SpecError),

    #[error("Model list for {0} is empty")]
    EmptyModels(Capability),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Which provider to build, and its options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Registered provider type
    #[serde(rename = "type")]
    pub kind: String,

    /// Provider-specific options, passed to its factory
    pub options: JsonValue,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: "gemini".to_string(),
            options: serde_json::json!({}),
        }
    }
}

/// Retry settings with human-readable durations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts_per_model: u32,

    #[serde(with = "human_duration")]
    pub base_delay: Duration,

    #[serde(with = "human_duration")]
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetryPolicy::default().into()
    }
}

impl From<RetryPolicy> for RetrySettings {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts_per_model: policy.max_attempts_per_model,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        RetryPolicy::default()
            .with_max_attempts(settings.max_attempts_per_model)
            .with_base_delay(settings.base_delay)
            .with_max_delay(settings.max_delay)
    }
}

/// Default model chains per capability, most preferred first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelCatalog {
    pub text: Vec<String>,
    pub image: Vec<String>,
    pub audio: Vec<String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            text: vec!["gemini-2.5-flash".into(), "gemini-2.0-flash".into()],
            image: vec![
                "gemini-2.5-flash-image".into(),
                "gemini-2.0-flash-preview-image-generation".into(),
            ],
            audio: vec!["gemini-2.5-flash-preview-tts".into()],
        }
    }
}

impl ModelCatalog {
    /// Chain for a capability.
    pub fn for_capability(&self, capability: Capability) -> &[String] {
        match capability {
            Capability::Text => &self.text,
            Capability::Image => &self.image,
            Capability::Audio => &self.audio,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for capability in [Capability::Text, Capability::Image, Capability::Audio] {
            if self.for_capability(capability).is_empty() {
                return Err(ConfigError::EmptyModels(capability));
            }
        }
        Ok(())
    }
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderSettings,

    /// Default retry policy for new request specs
    pub retry: RetrySettings,

    pub models: ModelCatalog,

    /// Per-request HTTP timeout, forwarded to the provider
    #[serde(with = "human_duration")]
    pub request_timeout: Duration,

    /// Optional deadline for a single attempt, enforced by the invoker
    #[serde(with = "human_duration::option")]
    pub attempt_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            retry: RetrySettings::default(),
            models: ModelCatalog::default(),
            request_timeout: Duration::from_secs(60),
            attempt_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load from a file if given, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy().validate()?;
        self.models.validate()
    }

    /// Default retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    /// Provider options with the request timeout filled in.
    pub fn provider_options(&self) -> JsonValue {
        let mut options = match &self.provider.options {
            JsonValue::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        options
            .entry("timeout")
            .or_insert_with(|| humantime::format_duration(self.request_timeout).to_string().into());
        JsonValue::Object(options)
    }

    /// Build the configured provider through a registry.
    pub fn build_provider(
        &self,
        registry: &ProviderRegistry,
    ) -> Result<Arc<dyn GenerativeProvider>, ConfigError> {
        Ok(registry.create(&self.provider.kind, &self.provider_options())?)
    }
}

/// Serde adapter for humantime durations ("1s", "250ms", "2m").
mod human_duration {
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
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
