//! User-facing messages.
//!
//! Only the strings in `UserMessage` may reach an end user. Raw vendor
//! errors are logged internally and then mapped onto this fixed set.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{classify, FailureReason, UpstreamFailure};

/// Fixed set of human-readable failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMessage {
    ReconnectCredential,
    PermissionDenied,
    QuotaExceeded,
    InvalidRequest,
    TimedOut,
    ServiceUnavailable,
    TooManyRequests,
    Unexpected,
    NetworkError,
    ContentBlocked,
    NotConfigured,
    Cancelled,
    Generic,
}

impl UserMessage {
    /// The message text.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserMessage::ReconnectCredential => "Please reconnect your API key to continue.",
            UserMessage::PermissionDenied => {
                "Unable to access the AI service. Please check your permissions."
            }
            UserMessage::QuotaExceeded => {
                "Daily generation limit reached. Please try again tomorrow."
            }
            UserMessage::InvalidRequest => "Invalid request. Please try a different prompt.",
            UserMessage::TimedOut => {
                "Request timed out. Please check your internet connection and try again."
            }
            UserMessage::ServiceUnavailable => {
                "Service temporarily unavailable. Please try again in a moment."
            }
            UserMessage::TooManyRequests => {
                "Too many requests. Please wait a moment and try again."
            }
            UserMessage::Unexpected => "An unexpected error occurred. Please try again.",
            UserMessage::NetworkError => {
                "Network error. Please check your internet connection and try again."
            }
            UserMessage::ContentBlocked => {
                "This request was blocked by content filters. Please try a different prompt."
            }
            UserMessage::NotConfigured => {
                "This feature is not configured correctly. Please try again later."
            }
            UserMessage::Cancelled => "Generation was cancelled.",
            UserMessage::Generic => {
                "Unable to create your content. Please check your internet connection and try again."
            }
        }
    }

    /// Message for a classified failure reason.
    pub fn for_reason(reason: FailureReason) -> Self {
        match reason {
            FailureReason::CredentialInvalid => UserMessage::ReconnectCredential,
            FailureReason::PermissionDenied => UserMessage::PermissionDenied,
            FailureReason::QuotaExceeded => UserMessage::QuotaExceeded,
            FailureReason::InvalidArgument | FailureReason::ModelNotFound => {
                UserMessage::InvalidRequest
            }
            FailureReason::Timeout => UserMessage::TimedOut,
            FailureReason::Unavailable => UserMessage::ServiceUnavailable,
            FailureReason::RateLimited => UserMessage::TooManyRequests,
            FailureReason::ServerError => UserMessage::Unexpected,
            FailureReason::Network => UserMessage::NetworkError,
            FailureReason::ContentBlocked => UserMessage::ContentBlocked,
            FailureReason::EmptyResponse | FailureReason::Unknown => UserMessage::Generic,
        }
    }
}

impl fmt::Display for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitize free-form error text from outside the invoker.
pub fn sanitize_text(error: &str) -> UserMessage {
    UserMessage::for_reason(classify(&UpstreamFailure::message(error)))
}
