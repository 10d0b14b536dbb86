//! Resilience patterns for genrelay-runtime.
//!
//! - Exponential backoff between attempts on one model
//! - Retry and fallback decisions along the model chain
//!
//! Nothing here keeps state between invocations.

mod backoff;
mod fallback;

pub use backoff::BackoffSchedule;
pub use fallback::{next_step, Position, Step, Terminal};
