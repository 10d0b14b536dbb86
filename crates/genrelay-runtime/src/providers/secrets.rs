//! Credential handling for providers.
//!
//! Keys are wrapped in `secrecy::SecretString` as soon as they are read, so
//! they cannot appear in `Debug` or `Display` output. They are exposed only
//! at the point of use (an HTTP header).
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(
//!     &config,
//!     "api_key",
//!     &GEMINI_API_KEY_ENVS,
//!     "Gemini API key",
//! )?;
//! request.header("x-goog-api-key", cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration file/JSON
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` show `[REDACTED]`. Use [`expose`](Self::expose)
/// when the raw value is needed.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a raw value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from the first set, non-empty environment variable in `env_vars`.
    pub fn from_env(env_vars: &[&str], name: &'static str) -> Result<Self, ProviderError> {
        first_env(env_vars)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} not set: configure one of {:?}",
                    name, env_vars
                ))
            })
    }

    /// Load from JSON config, falling back to environment variables.
    ///
    /// 1. `config[config_key]` if it is a non-empty string
    /// 2. The first set variable in `env_vars`
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_vars: &[&str],
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str().filter(|v| !v.is_empty()) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Some(value) = first_env(env_vars) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or one of {:?}",
            name, config_key, env_vars
        )))
    }

    /// Check if a credential is available without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_vars: &[&str]) -> bool {
        config[config_key]
            .as_str()
            .map(|v| !v.is_empty())
            .unwrap_or(false)
            || first_env(env_vars).is_some()
    }

    /// Expose the raw value. Call only where it is sent.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn first_env(env_vars: &[&str]) -> Option<String> {
    env_vars
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
