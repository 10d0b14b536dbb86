//! The resilient invoker.
//!
//! `ResilientInvoker::invoke` turns one `RequestSpec` into one
//! `InvocationOutcome`:
//! - Each model in the chain gets up to `max_attempts_per_model` attempts
//! - Transient failures sleep `min(base * 2^(a-1), max)` before the next try
//! - Permanent failures move to the next model without sleeping
//! - A rejected credential stops everything
//! - A response without a usable part counts as a transient failure
//!
//! The invoker holds no state between calls. Each call builds its own
//! attempt log and schedule, so concurrent invocations never interact.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use genrelay_core::{
    classify, extract, AttemptRecord, AttemptResult, FailureReason, GeneratedContent, Generation,
    InvocationError, InvocationOutcome, RequestSpec,
};

use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::{GenerativeProvider, ProviderError, ProviderRegistry};
use crate::resilience::{next_step, BackoffSchedule, Position, Step, Terminal};

/// Classified outcome of one failed attempt.
#[derive(Debug, Clone, Copy)]
struct AttemptFailure {
    reason: FailureReason,
    status: Option<u16>,
}

/// Retry, backoff and model fallback around a provider.
pub struct ResilientInvoker {
    provider: Arc<dyn GenerativeProvider>,

    /// Deadline for a single provider call, on top of the transport timeout
    attempt_timeout: Option<Duration>,
}

impl std::fmt::Debug for ResilientInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientInvoker")
            .field("provider", &self.provider.name())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl ResilientInvoker {
    /// Create an invoker over an explicit provider handle.
    pub fn new(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self {
            provider,
            attempt_timeout: None,
        }
    }

    /// Build the configured provider and wrap it.
    pub fn from_config(
        config: &RuntimeConfig,
        registry: &ProviderRegistry,
    ) -> Result<Self, ConfigError> {
        let invoker = Self::new(config.build_provider(registry)?);
        Ok(match config.attempt_timeout {
            Some(limit) => invoker.with_attempt_timeout(limit),
            None => invoker,
        })
    }

    /// Bound each provider call; an overrun counts as a transient timeout.
    pub fn with_attempt_timeout(mut self, limit: Duration) -> Self {
        self.attempt_timeout = Some(limit);
        self
    }

    pub fn provider(&self) -> &Arc<dyn GenerativeProvider> {
        &self.provider
    }

    /// Run one invocation to completion.
    pub async fn invoke(&self, spec: &RequestSpec) -> InvocationOutcome {
        self.invoke_with_cancel(spec, &CancellationToken::new())
            .await
    }

    /// Run one invocation, stopping early if `cancel` fires.
    ///
    /// Cancellation is checked before every attempt and interrupts both an
    /// in-flight call and a backoff sleep.
    pub async fn invoke_with_cancel(
        &self,
        spec: &RequestSpec,
        cancel: &CancellationToken,
    ) -> InvocationOutcome {
        if let Err(error) = spec.validate() {
            tracing::warn!(error = %error, "Rejecting request spec before any call");
            return Err(InvocationError::invalid_configuration(error));
        }

        let schedule = BackoffSchedule::from_policy(&spec.retry);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut position = Position::start();

        loop {
            if cancel.is_cancelled() {
                tracing::info!(attempts = attempts.len(), "Invocation cancelled");
                return Err(InvocationError::cancelled(attempts));
            }

            let model = spec.models[position.model_index].as_str();
            let started_at = Utc::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(model, attempt = position.attempt, "Invocation cancelled mid-call");
                    return Err(InvocationError::cancelled(attempts));
                }
                result = self.attempt(model, spec) => result,
            };

            let failure = match result {
                Ok(content) => {
                    attempts.push(AttemptRecord {
                        model: model.to_string(),
                        attempt: position.attempt,
                        started_at,
                        result: AttemptResult::Succeeded,
                        backoff: None,
                    });
                    tracing::info!(
                        model,
                        attempt = position.attempt,
                        total_attempts = attempts.len(),
                        "Generation succeeded"
                    );
                    return Ok(Generation {
                        content,
                        model: model.to_string(),
                        attempts,
                    });
                }
                Err(failure) => failure,
            };

            let step = next_step(position, failure.reason, spec.models.len(), &schedule);
            attempts.push(AttemptRecord {
                model: model.to_string(),
                attempt: position.attempt,
                started_at,
                result: AttemptResult::Failed {
                    reason: failure.reason,
                    status: failure.status,
                },
                backoff: match step {
                    Step::Retry { delay, .. } => Some(delay),
                    _ => None,
                },
            });

            match step {
                Step::Retry { next, delay } => {
                    tracing::warn!(
                        model,
                        attempt = position.attempt,
                        class = %failure.reason.class(),
                        reason = %failure.reason,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying after backoff"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::info!(model, "Invocation cancelled during backoff");
                            return Err(InvocationError::cancelled(attempts));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    position = next;
                }
                Step::Fallback { next } => {
                    tracing::warn!(
                        model,
                        attempt = position.attempt,
                        class = %failure.reason.class(),
                        reason = %failure.reason,
                        next_model = spec.models[next.model_index].as_str(),
                        "Falling back to next model"
                    );
                    position = next;
                }
                Step::Stop(terminal) => {
                    let error = match terminal {
                        Terminal::CredentialInvalid => InvocationError::credential_invalid(attempts),
                        Terminal::Permanent(reason) => InvocationError::permanent(reason, attempts),
                        Terminal::Exhausted(reason) => {
                            InvocationError::exhausted(Some(reason), attempts)
                        }
                    };
                    tracing::warn!(
                        model,
                        reason = %failure.reason,
                        total_attempts = error.attempts.len(),
                        kind = ?error.kind,
                        "Invocation failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// One provider call plus content extraction.
    async fn attempt(
        &self,
        model: &str,
        spec: &RequestSpec,
    ) -> Result<GeneratedContent, AttemptFailure> {
        let call = self.provider.generate(model, spec);
        let response = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ProviderError::Timeout(limit))),
            None => call.await,
        };

        let envelope = response.map_err(|error| {
            let reason = classify(&error.to_upstream());
            // Raw upstream text stays in the logs
            tracing::debug!(
                model,
                provider = self.provider.name(),
                error = %error,
                reason = %reason,
                "Provider call failed"
            );
            AttemptFailure {
                reason,
                status: error.status(),
            }
        })?;

        extract(&envelope, spec.capability).map_err(|error| {
            tracing::debug!(model, error = %error, "Response held no usable content");
            AttemptFailure {
                reason: FailureReason::EmptyResponse,
                status: None,
            }
        })
    }
}
