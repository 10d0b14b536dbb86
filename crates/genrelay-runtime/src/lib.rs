//! # genrelay-runtime
//!
//! Resilient invocation of generative-AI providers.
//!
//! `genrelay-core` describes requests and judges responses; this crate makes
//! the calls. The [`ResilientInvoker`] wraps an explicit provider handle
//! with bounded per-model retry, exponential backoff and model fallback,
//! and returns either content or a sanitized [`InvocationError`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use genrelay_core::{Capability, RequestSpec};
//! use genrelay_runtime::{GeminiProvider, ResilientInvoker};
//!
//! let provider = Arc::new(GeminiProvider::from_env()?);
//! let invoker = ResilientInvoker::new(provider);
//!
//! let spec = RequestSpec::builder(Capability::Text)
//!     .models(["gemini-2.5-flash", "gemini-2.0-flash"])
//!     .prompt("Name three Paris landmarks")
//!     .build()?;
//!
//! match invoker.invoke(&spec).await {
//!     Ok(generation) => println!("{}", generation.content.as_text().unwrap_or_default()),
//!     Err(e) if e.is_credential_invalid() => reprompt_for_key(),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```
//!
//! [`InvocationError`]: genrelay_core::InvocationError

pub mod config;
pub mod invoker;
pub mod providers;
pub mod resilience;

pub use config::{ConfigError, ModelCatalog, ProviderSettings, RetrySettings, RuntimeConfig};
pub use invoker::ResilientInvoker;
pub use providers::{
    ApiCredential, CredentialSource, GenerativeProvider, ProviderError, ProviderFactory,
    ProviderRegistry,
};
pub use resilience::BackoffSchedule;

#[cfg(feature = "gemini")]
pub use providers::{GeminiProvider, GeminiProviderFactory};

pub use tokio_util::sync::CancellationToken;
