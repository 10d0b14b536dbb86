//! Generative provider abstractions for genrelay-runtime.
//!
//! A provider performs exactly one upstream call per `generate` and reports
//! failures as `ProviderError`. Retries, backoff and model fallback belong to
//! the [`ResilientInvoker`](crate::ResilientInvoker), never to a provider.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use genrelay_core::{RequestSpec, ResponseEnvelope, UpstreamFailure};

mod factory;
pub mod secrets;

#[cfg(feature = "gemini")]
mod gemini;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, DEFAULT_GEMINI_BASE_URL};

/// Environment variables consulted for the Gemini API key, in order.
pub const GEMINI_API_KEY_ENVS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Errors from providers.
///
/// Messages may carry raw upstream text. They are for logs only and must be
/// classified before anything reaches an end user.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} {code:?} - {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Structured view of this error for classification.
    pub fn to_upstream(&self) -> UpstreamFailure {
        match self {
            ProviderError::Http(message) | ProviderError::Parse(message) => {
                UpstreamFailure::message(message.clone())
            }
            ProviderError::RateLimited { .. } => UpstreamFailure::http(429, "rate limited"),
            ProviderError::Api {
                status,
                code,
                message,
            } => UpstreamFailure {
                status: Some(*status),
                code: code.clone(),
                message: message.clone(),
            },
            ProviderError::Auth(message) => UpstreamFailure::http(401, message.clone()),
            ProviderError::Timeout(after) => {
                UpstreamFailure::message(format!("request timed out after {:?}", after))
            }
            ProviderError::NotConfigured(message) => {
                UpstreamFailure::message(message.clone()).with_code("FAILED_PRECONDITION")
            }
        }
    }

    /// HTTP status, if the upstream answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Auth(_) => Some(401),
            _ => None,
        }
    }
}

/// Provider abstraction allows swapping generative backends.
///
/// Implementations are handles owned by the caller; there is no global
/// client.
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Make one `generateContent` call against `model`.
    async fn generate(
        &self,
        model: &str,
        spec: &RequestSpec,
    ) -> Result<ResponseEnvelope, ProviderError>;

    /// Check if provider is usable (credential present, endpoint sane).
    async fn health_check(&self) -> bool;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use genrelay_core::{classify, FailureClass, FailureReason};

    #[test]
    fn test_auth_error_is_credential_invalid() {
        let err = ProviderError::Auth("bad key".into());
        assert_eq!(
            classify(&err.to_upstream()).class(),
            FailureClass::CredentialInvalid
        );
    }

    #[test]
    fn test_rate_limited_is_transient() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(classify(&err.to_upstream()), FailureReason::RateLimited);
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = ProviderError::Timeout(Duration::from_secs(30));
        assert_eq!(classify(&err.to_upstream()), FailureReason::Timeout);
    }

    #[test]
    fn test_api_error_keeps_code() {
        let err = ProviderError::Api {
            status: 503,
            code: Some("UNAVAILABLE".into()),
            message: "The model is overloaded. Please try again later.".into(),
        };
        let upstream = err.to_upstream();
        assert_eq!(upstream.code.as_deref(), Some("UNAVAILABLE"));
        assert_eq!(classify(&upstream), FailureReason::Unavailable);
    }

    #[test]
    fn test_not_configured_is_permanent() {
        let err = ProviderError::NotConfigured("gemini feature disabled".into());
        assert_eq!(
            classify(&err.to_upstream()).class(),
            FailureClass::Permanent
        );
    }
}
