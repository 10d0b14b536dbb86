//! Request model for a single generative-AI invocation.
//!
//! A `RequestSpec` is built fresh per user action and discarded once the
//! outcome is delivered. It carries everything a transport needs, plus the
//! ordered model chain and retry policy the invoker walks through.

mod policy;
mod spec;

pub use policy::RetryPolicy;
pub use spec::{
    Capability, GenerationSettings, HarmBlockThreshold, HarmCategory, InlineBlob, Payload,
    RequestSpec, RequestSpecBuilder, SafetySetting, SpecError,
};
