//! Retry and model-fallback decisions.
//!
//! The invoker walks an ordered model chain. After every failed attempt it
//! asks [`next_step`] what to do, so the whole policy is one pure function
//! that can be tested without a runtime:
//!
//! | Failure class | Attempts left on model | More models | Step |
//! |---|---|---|---|
//! | `CredentialInvalid` | any | any | `Stop(CredentialInvalid)` |
//! | `Permanent` | any | yes | `Fallback` |
//! | `Permanent` | any | no | `Stop(Permanent)` |
//! | `Transient` | yes | any | `Retry` after backoff |
//! | `Transient` | no | yes | `Fallback` |
//! | `Transient` | no | no | `Stop(Exhausted)` |

use std::time::Duration;

use genrelay_core::{FailureClass, FailureReason};

use super::BackoffSchedule;

/// Where the invoker is in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Index into the model chain
    pub model_index: usize,

    /// 1-based attempt on that model
    pub attempt: u32,
}

impl Position {
    /// First attempt on the first model.
    pub fn start() -> Self {
        Self {
            model_index: 0,
            attempt: 1,
        }
    }

    fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }

    fn next_model(self) -> Self {
        Self {
            model_index: self.model_index + 1,
            attempt: 1,
        }
    }
}

/// Why an invocation stopped without content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Every model ran out of attempts; carries the last reason
    Exhausted(FailureReason),

    /// The last model rejected the request permanently
    Permanent(FailureReason),

    CredentialInvalid,
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sleep `delay`, then try the same model again
    Retry { next: Position, delay: Duration },

    /// Move to the next model immediately
    Fallback { next: Position },

    /// Give up
    Stop(Terminal),
}

/// Decide the step after `reason` failed the attempt at `at`.
pub fn next_step(
    at: Position,
    reason: FailureReason,
    model_count: usize,
    schedule: &BackoffSchedule,
) -> Step {
    let has_next_model = at.model_index + 1 < model_count;

    match reason.class() {
        FailureClass::CredentialInvalid => Step::Stop(Terminal::CredentialInvalid),
        FailureClass::Permanent if has_next_model => Step::Fallback {
            next: at.next_model(),
        },
        FailureClass::Permanent => Step::Stop(Terminal::Permanent(reason)),
        FailureClass::Transient => match schedule.delay_after(at.attempt) {
            Some(delay) => Step::Retry {
                next: at.retry(),
                delay,
            },
            None if has_next_model => Step::Fallback {
                next: at.next_model(),
            },
            None => Step::Stop(Terminal::Exhausted(reason)),
        },
    }
}
