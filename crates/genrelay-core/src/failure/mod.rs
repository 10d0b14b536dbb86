//! Failure taxonomy, classification and sanitization.
//!
//! Every upstream failure is reduced to a `FailureReason`, which belongs
//! to exactly one `FailureClass`:
//!
//! | Class | Retried on same model | Falls back to next model |
//! |---|---|---|
//! | `Transient` | yes, with backoff | after the last attempt |
//! | `Permanent` | no | yes, immediately |
//! | `CredentialInvalid` | no | no, surfaced to the caller |

pub mod patterns;
mod sanitize;

pub use sanitize::{sanitize_text, UserMessage};

use serde::{Deserialize, Serialize};
use std::fmt;

use patterns::*;

/// Coarse retry class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Expected to resolve on its own when retried
    Transient,

    /// Will not resolve by retrying the same request on the same model
    Permanent,

    /// The configured credential is rejected; caller must re-prompt
    CredentialInvalid,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::CredentialInvalid => write!(f, "credential_invalid"),
        }
    }
}

/// Fine-grained failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RateLimited,
    QuotaExceeded,
    Unavailable,
    ServerError,
    Timeout,
    Network,
    /// Transport succeeded but no usable content part came back
    EmptyResponse,
    InvalidArgument,
    PermissionDenied,
    ContentBlocked,
    ModelNotFound,
    CredentialInvalid,
    Unknown,
}

impl FailureReason {
    /// Retry class of this reason.
    pub fn class(&self) -> FailureClass {
        match self {
            FailureReason::RateLimited
            | FailureReason::QuotaExceeded
            | FailureReason::Unavailable
            | FailureReason::ServerError
            | FailureReason::Timeout
            | FailureReason::Network
            | FailureReason::EmptyResponse
            | FailureReason::Unknown => FailureClass::Transient,
            FailureReason::InvalidArgument
            | FailureReason::PermissionDenied
            | FailureReason::ContentBlocked
            | FailureReason::ModelNotFound => FailureClass::Permanent,
            FailureReason::CredentialInvalid => FailureClass::CredentialInvalid,
        }
    }

    /// Whether this reason is worth a backoff retry.
    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::RateLimited => "rate_limited",
            FailureReason::QuotaExceeded => "quota_exceeded",
            FailureReason::Unavailable => "unavailable",
            FailureReason::ServerError => "server_error",
            FailureReason::Timeout => "timeout",
            FailureReason::Network => "network",
            FailureReason::EmptyResponse => "empty_response",
            FailureReason::InvalidArgument => "invalid_argument",
            FailureReason::PermissionDenied => "permission_denied",
            FailureReason::ContentBlocked => "content_blocked",
            FailureReason::ModelNotFound => "model_not_found",
            FailureReason::CredentialInvalid => "credential_invalid",
            FailureReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured view of an upstream failure, as far as the transport knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamFailure {
    /// HTTP status, if a response was received
    pub status: Option<u16>,

    /// RPC status string, e.g. "RESOURCE_EXHAUSTED"
    pub code: Option<String>,

    /// Raw message; internal only, never shown to users
    pub message: String,
}

impl UpstreamFailure {
    /// Failure with only a message (network errors, SDK exceptions).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Failure with an HTTP status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
        }
    }

    /// Attach an RPC status string.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Classify this failure.
    pub fn classify(&self) -> FailureReason {
        classify(self)
    }
}

/// Classify an upstream failure.
///
/// Evidence is consulted in order:
/// 1. Credential signals (message patterns, HTTP 401, `UNAUTHENTICATED`)
/// 2. RPC status string
/// 3. HTTP status
/// 4. Message pattern table (see [`patterns`])
///
/// Anything unrecognized is `Unknown`, which is transient so the bounded
/// retry policy still applies.
pub fn classify(failure: &UpstreamFailure) -> FailureReason {
    let message = failure.message.as_str();

    if failure.status == Some(401)
        || failure.code.as_deref() == Some("UNAUTHENTICATED")
        || mentions_credential(message)
    {
        return FailureReason::CredentialInvalid;
    }

    if let Some(reason) = failure.code.as_deref().and_then(|c| classify_code(c, message)) {
        return reason;
    }

    if let Some(reason) = failure.status.and_then(|s| classify_status(s, message)) {
        return reason;
    }

    classify_message(message)
}

fn classify_code(code: &str, message: &str) -> Option<FailureReason> {
    let reason = match code.to_ascii_uppercase().as_str() {
        "RESOURCE_EXHAUSTED" => rate_limit_reason(message),
        "UNAVAILABLE" => FailureReason::Unavailable,
        "DEADLINE_EXCEEDED" => FailureReason::Timeout,
        "INTERNAL" | "ABORTED" | "UNKNOWN" | "DATA_LOSS" => FailureReason::ServerError,
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
            invalid_request_reason(message)
        }
        "PERMISSION_DENIED" => FailureReason::PermissionDenied,
        "NOT_FOUND" => FailureReason::ModelNotFound,
        _ => return None,
    };
    Some(reason)
}

fn classify_status(status: u16, message: &str) -> Option<FailureReason> {
    let reason = match status {
        429 => rate_limit_reason(message),
        408 | 504 => FailureReason::Timeout,
        503 => FailureReason::Unavailable,
        500..=599 => FailureReason::ServerError,
        403 => FailureReason::PermissionDenied,
        404 => FailureReason::ModelNotFound,
        400..=499 => invalid_request_reason(message),
        _ => return None,
    };
    Some(reason)
}

fn classify_message(message: &str) -> FailureReason {
    if QUOTA_PATTERN.is_match(message) {
        FailureReason::QuotaExceeded
    } else if RATE_LIMIT_PATTERN.is_match(message) {
        FailureReason::RateLimited
    } else if UNAVAILABLE_PATTERN.is_match(message) {
        FailureReason::Unavailable
    } else if TIMEOUT_PATTERN.is_match(message) {
        FailureReason::Timeout
    } else if NETWORK_PATTERN.is_match(message) {
        FailureReason::Network
    } else if SERVER_ERROR_PATTERN.is_match(message) {
        FailureReason::ServerError
    } else if CONTENT_BLOCKED_PATTERN.is_match(message) {
        FailureReason::ContentBlocked
    } else if PERMISSION_PATTERN.is_match(message) {
        FailureReason::PermissionDenied
    } else if MODEL_NOT_FOUND_PATTERN.is_match(message) {
        FailureReason::ModelNotFound
    } else if INVALID_ARGUMENT_PATTERN.is_match(message) {
        FailureReason::InvalidArgument
    } else {
        FailureReason::Unknown
    }
}

fn rate_limit_reason(message: &str) -> FailureReason {
    if QUOTA_PATTERN.is_match(message) {
        FailureReason::QuotaExceeded
    } else {
        FailureReason::RateLimited
    }
}

fn invalid_request_reason(message: &str) -> FailureReason {
    if CONTENT_BLOCKED_PATTERN.is_match(message) {
        FailureReason::ContentBlocked
    } else {
        FailureReason::InvalidArgument
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_not_found_is_credential_invalid() {
        let failure = UpstreamFailure::http(404, "Requested entity was not found.")
            .with_code("NOT_FOUND");
        assert_eq!(classify(&failure), FailureReason::CredentialInvalid);
        assert_eq!(classify(&failure).class(), FailureClass::CredentialInvalid);
    }

    #[test]
    fn test_bad_api_key_is_credential_invalid() {
        // The upstream reports bad keys as 400 INVALID_ARGUMENT
        let failure = UpstreamFailure::http(400, "API key not valid. Please pass a valid API key.")
            .with_code("INVALID_ARGUMENT");
        assert_eq!(classify(&failure), FailureReason::CredentialInvalid);
    }

    #[test]
    fn test_rpc_code_beats_status() {
        let failure = UpstreamFailure::http(500, "The model is overloaded").with_code("UNAVAILABLE");
        assert_eq!(classify(&failure), FailureReason::Unavailable);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify(&UpstreamFailure::http(429, "slow down")),
            FailureReason::RateLimited
        );
        assert_eq!(
            classify(&UpstreamFailure::http(429, "You exceeded your current quota")),
            FailureReason::QuotaExceeded
        );
        assert_eq!(
            classify(&UpstreamFailure::http(503, "")),
            FailureReason::Unavailable
        );
        assert_eq!(
            classify(&UpstreamFailure::http(502, "")),
            FailureReason::ServerError
        );
        assert_eq!(
            classify(&UpstreamFailure::http(404, "models/x is not found")),
            FailureReason::ModelNotFound
        );
        assert_eq!(
            classify(&UpstreamFailure::http(400, "bad field")),
            FailureReason::InvalidArgument
        );
    }

    #[test]
    fn test_safety_rejection_is_permanent() {
        let failure = UpstreamFailure::http(400, "Request blocked due to SAFETY")
            .with_code("INVALID_ARGUMENT");
        let reason = classify(&failure);
        assert_eq!(reason, FailureReason::ContentBlocked);
        assert_eq!(reason.class(), FailureClass::Permanent);
    }

    #[test]
    fn test_message_only_classification() {
        assert_eq!(
            classify(&UpstreamFailure::message("TypeError: Failed to fetch")),
            FailureReason::Network
        );
        assert_eq!(
            classify(&UpstreamFailure::message("[503 Service Unavailable]")),
            FailureReason::Unavailable
        );
        assert_eq!(
            classify(&UpstreamFailure::message("operation timed out")),
            FailureReason::Timeout
        );
        assert_eq!(
            classify(&UpstreamFailure::message("something odd")),
            FailureReason::Unknown
        );
    }

    #[test]
    fn test_unknown_is_transient() {
        assert!(FailureReason::Unknown.is_transient());
        assert!(FailureReason::EmptyResponse.is_transient());
        assert!(!FailureReason::ModelNotFound.is_transient());
    }
}
