//! # genrelay-core
//!
//! Deterministic building blocks for resilient generative-AI calls.
//!
//! This crate describes *what* to ask an upstream model and *how* to read
//! and judge what comes back:
//! - Which request to send (`RequestSpec`, with an ordered model chain)
//! - Whether a response holds usable content (`response::extract`)
//! - Whether a failure is worth retrying (`failure::classify`)
//! - What the end user is allowed to see (`failure::UserMessage`)
//!
//! ## Key Guarantees
//!
//! 1. **No network calls**: transports live in `genrelay-runtime`
//! 2. **Closed taxonomy**: every failure maps to `Transient`, `Permanent`
//!    or `CredentialInvalid`
//! 3. **Sanitized surface**: raw vendor text never reaches a `UserMessage`
//!
//! ## Example
//!
//! ```rust,ignore
//! use genrelay_core::{Capability, RequestSpec};
//!
//! let spec = RequestSpec::builder(Capability::Image)
//!     .model("gemini-2.5-flash-image")
//!     .model("gemini-2.0-flash-preview-image-generation")
//!     .prompt("A watercolor postcard of the Eiffel Tower")
//!     .build()?;
//! ```

pub mod audio;
pub mod failure;
pub mod outcome;
pub mod recipe;
pub mod request;
pub mod response;

// Re-export main types at crate root
pub use audio::{AudioError, PcmAudio};
pub use failure::{
    classify, sanitize_text, FailureClass, FailureReason, UpstreamFailure, UserMessage,
};
pub use outcome::{
    AttemptRecord, AttemptResult, FailureKind, Generation, InvocationError, InvocationOutcome,
};
pub use recipe::{Recipe, RecipeBook, RecipeError, Variable};
pub use request::{
    Capability, GenerationSettings, HarmBlockThreshold, HarmCategory, InlineBlob, Payload,
    RequestSpec, RequestSpecBuilder, RetryPolicy, SafetySetting, SpecError,
};
pub use response::{
    extract, Candidate, ExtractionError, GeneratedContent, ResponseEnvelope, ResponsePart,
};
