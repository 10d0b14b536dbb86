//! Invocation outcomes and the per-attempt log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::failure::{FailureClass, FailureReason, UserMessage};
use crate::request::SpecError;
use crate::response::GeneratedContent;

/// Result of a single attempt against one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptResult {
    Succeeded,
    Failed {
        reason: FailureReason,
        status: Option<u16>,
    },
}

impl AttemptResult {
    /// Failure class, if the attempt failed.
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            AttemptResult::Succeeded => None,
            AttemptResult::Failed { reason, .. } => Some(reason.class()),
        }
    }

    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            AttemptResult::Succeeded => None,
            AttemptResult::Failed { reason, .. } => Some(*reason),
        }
    }
}

/// One line of the attempt log. Holds no raw vendor text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// Model the attempt was made against
    pub model: String,

    /// 1-based attempt number for this model
    pub attempt: u32,

    /// When the attempt started
    pub started_at: DateTime<Utc>,

    /// What happened
    pub result: AttemptResult,

    /// Delay slept after this attempt before retrying the same model
    pub backoff: Option<Duration>,
}

/// A successful invocation.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Extracted content
    pub content: GeneratedContent,

    /// Model that produced it
    pub model: String,

    /// Every attempt made, in order, including the successful one
    pub attempts: Vec<AttemptRecord>,
}

impl Generation {
    /// Number of attempts made against `model`.
    pub fn attempts_for(&self, model: &str) -> usize {
        count_attempts(&self.attempts, model)
    }
}

/// How an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The spec was rejected before any call was made
    InvalidConfiguration(SpecError),

    /// Every model ran out of attempts
    Exhausted,

    /// The last model rejected the request permanently
    Permanent,

    /// The credential was rejected; the caller should re-prompt for it
    CredentialInvalid,

    /// The caller cancelled the invocation
    Cancelled,
}

/// A failed invocation.
///
/// `Display` yields only the sanitized user message.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct InvocationError {
    /// Failure kind
    pub kind: FailureKind,

    /// Sanitized message for the end user
    pub message: UserMessage,

    /// Reason of the last failed attempt, if any attempt was made
    pub last_reason: Option<FailureReason>,

    /// Every attempt made, in order
    pub attempts: Vec<AttemptRecord>,
}

impl InvocationError {
    /// The spec failed validation; no call was made.
    pub fn invalid_configuration(error: SpecError) -> Self {
        Self {
            kind: FailureKind::InvalidConfiguration(error),
            message: UserMessage::NotConfigured,
            last_reason: None,
            attempts: Vec::new(),
        }
    }

    /// All models and attempts were spent.
    pub fn exhausted(last_reason: Option<FailureReason>, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            kind: FailureKind::Exhausted,
            message: UserMessage::Generic,
            last_reason,
            attempts,
        }
    }

    /// The last model rejected the request for a permanent reason.
    pub fn permanent(reason: FailureReason, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: UserMessage::for_reason(reason),
            last_reason: Some(reason),
            attempts,
        }
    }

    /// The credential was rejected.
    pub fn credential_invalid(attempts: Vec<AttemptRecord>) -> Self {
        Self {
            kind: FailureKind::CredentialInvalid,
            message: UserMessage::ReconnectCredential,
            last_reason: Some(FailureReason::CredentialInvalid),
            attempts,
        }
    }

    /// The caller cancelled.
    pub fn cancelled(attempts: Vec<AttemptRecord>) -> Self {
        let last_reason = attempts.iter().rev().find_map(|a| match a.result {
            AttemptResult::Failed { reason, .. } => Some(reason),
            AttemptResult::Succeeded => None,
        });
        Self {
            kind: FailureKind::Cancelled,
            message: UserMessage::Cancelled,
            last_reason,
            attempts,
        }
    }

    /// Whether the caller should re-prompt for credentials.
    pub fn is_credential_invalid(&self) -> bool {
        self.kind == FailureKind::CredentialInvalid
    }

    /// The sanitized message text.
    pub fn user_message(&self) -> &'static str {
        self.message.as_str()
    }

    /// Number of attempts made against `model`.
    pub fn attempts_for(&self, model: &str) -> usize {
        count_attempts(&self.attempts, model)
    }
}

/// What `invoke` returns.
pub type InvocationOutcome = Result<Generation, InvocationError>;

fn count_attempts(attempts: &[AttemptRecord], model: &str) -> usize {
    attempts.iter().filter(|a| a.model == model).count()
}
