//! `RequestSpec` and its parts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::RetryPolicy;

/// Errors from building or validating a request spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("Model list is empty: at least one model is required")]
    EmptyModelList,

    #[error("Model name at position {0} is blank")]
    BlankModelName(usize),

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),
}

/// What kind of content the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Plain or structured (JSON) text
    Text,
    /// An inline image blob
    Image,
    /// An inline audio blob (speech synthesis)
    Audio,
}

impl Capability {
    /// Response modality the upstream must be asked for, if any.
    ///
    /// Text is the upstream default and needs no explicit modality.
    pub fn response_modality(&self) -> Option<&'static str> {
        match self {
            Capability::Text => None,
            Capability::Image => Some("IMAGE"),
            Capability::Audio => Some("AUDIO"),
        }
    }

    /// MIME type prefix an inline blob must carry to satisfy this capability.
    pub fn mime_prefix(&self) -> Option<&'static str> {
        match self {
            Capability::Text => None,
            Capability::Image => Some("image/"),
            Capability::Audio => Some("audio/"),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Text => write!(f, "text"),
            Capability::Image => write!(f, "image"),
            Capability::Audio => write!(f, "audio"),
        }
    }
}

/// Binary content carried inline (reference images, generated images, audio).
#[derive(Clone, PartialEq, Eq)]
pub struct InlineBlob {
    /// MIME type, e.g. `image/png` or `audio/L16;codec=pcm;rate=24000`
    pub mime_type: String,

    /// Raw bytes (already base64-decoded)
    pub data: Vec<u8>,
}

impl InlineBlob {
    /// Create a blob from raw bytes.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Decode a blob from base64 text.
    pub fn from_base64(
        mime_type: impl Into<String>,
        encoded: &str,
    ) -> Result<Self, base64::DecodeError> {
        Ok(Self::new(mime_type, BASE64.decode(encoded.trim())?))
    }

    /// Encode the bytes as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    /// Render as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for InlineBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineBlob")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Harm categories understood by the upstream safety filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
    #[serde(rename = "HARM_CATEGORY_CIVIC_INTEGRITY")]
    CivicIntegrity,
}

/// Blocking threshold for a harm category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
    Off,
}

/// One safety filter override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// Create a safety setting.
    pub fn new(category: HarmCategory, threshold: HarmBlockThreshold) -> Self {
        Self {
            category,
            threshold,
        }
    }

    /// The four main categories with `BLOCK_NONE`, as creative image apps use.
    pub fn permissive() -> Vec<Self> {
        [
            HarmCategory::HateSpeech,
            HarmCategory::SexuallyExplicit,
            HarmCategory::Harassment,
            HarmCategory::DangerousContent,
        ]
        .into_iter()
        .map(|category| Self::new(category, HarmBlockThreshold::BlockNone))
        .collect()
    }
}

/// Per-call generation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Safety filter overrides
    pub safety_settings: Vec<SafetySetting>,

    /// Response MIME type (e.g. `application/json` for structured output)
    pub response_mime_type: Option<String>,

    /// Image aspect ratio, e.g. "16:9"
    pub aspect_ratio: Option<String>,

    /// Prebuilt voice name for speech synthesis, e.g. "Kore"
    pub voice: Option<String>,
}

/// The capability-specific payload of a call.
///
/// Domain validation (is the prompt sensible?) is the caller's job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Prompt text
    pub prompt: String,

    /// Optional system instruction
    pub system_instruction: Option<String>,

    /// Reference images sent ahead of the prompt
    pub reference_images: Vec<InlineBlob>,

    /// Structured-output schema for text requests
    pub response_schema: Option<serde_json::Value>,
}

/// A complete description of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Expected response modality
    pub capability: Capability,

    /// Candidate models, most preferred first
    pub models: Vec<String>,

    /// Prompt, references and schema
    pub payload: Payload,

    /// Generation configuration
    pub settings: GenerationSettings,

    /// Retry policy applied to each model
    pub retry: RetryPolicy,
}

impl RequestSpec {
    /// Start building a spec for the given capability.
    pub fn builder(capability: Capability) -> RequestSpecBuilder {
        RequestSpecBuilder::new(capability)
    }

    /// Check structural invariants.
    ///
    /// The model list must be non-empty and contain no blank names.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.models.is_empty() {
            return Err(SpecError::EmptyModelList);
        }
        if let Some(index) = self.models.iter().position(|m| m.trim().is_empty()) {
            return Err(SpecError::BlankModelName(index));
        }
        self.retry.validate()
    }

    /// Primary model, if any.
    pub fn primary_model(&self) -> Option<&str> {
        self.models.first().map(|m| m.as_str())
    }

    /// Models after the primary.
    pub fn fallback_models(&self) -> &[String] {
        self.models.get(1..).unwrap_or(&[])
    }
}

/// Builder for `RequestSpec`.
#[derive(Debug, Clone)]
pub struct RequestSpecBuilder {
    capability: Capability,
    models: Vec<String>,
    payload: Payload,
    settings: GenerationSettings,
    retry: RetryPolicy,
}

impl RequestSpecBuilder {
    /// Create a new builder.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            models: Vec::new(),
            payload: Payload::default(),
            settings: GenerationSettings::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Append a model to the chain.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.models.push(model.into());
        self
    }

    /// Append several models to the chain, in order.
    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models.extend(models.into_iter().map(Into::into));
        self
    }

    /// Set the prompt text.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.payload.prompt = prompt.into();
        self
    }

    /// Set the system instruction.
    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.payload.system_instruction = Some(instruction.into());
        self
    }

    /// Attach a reference image.
    pub fn reference_image(mut self, image: InlineBlob) -> Self {
        self.payload.reference_images.push(image);
        self
    }

    /// Request structured output matching a schema.
    ///
    /// Also sets the response MIME type to `application/json` when unset.
    pub fn response_schema(mut self, schema: serde_json::Value) -> Self {
        self.payload.response_schema = Some(schema);
        if self.settings.response_mime_type.is_none() {
            self.settings.response_mime_type = Some("application/json".to_string());
        }
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.settings.temperature = Some(temperature);
        self
    }

    /// Add a safety setting.
    pub fn safety_setting(mut self, setting: SafetySetting) -> Self {
        self.settings.safety_settings.push(setting);
        self
    }

    /// Set the response MIME type.
    pub fn response_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.settings.response_mime_type = Some(mime.into());
        self
    }

    /// Set the image aspect ratio.
    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.settings.aspect_ratio = Some(ratio.into());
        self
    }

    /// Set the speech voice.
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.settings.voice = Some(voice.into());
        self
    }

    /// Replace all generation settings.
    pub fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build and validate the spec.
    pub fn build(self) -> Result<RequestSpec, SpecError> {
        let spec = RequestSpec {
            capability: self.capability,
            models: self.models,
            payload: self.payload,
            settings: self.settings,
            retry: self.retry,
        };
        spec.validate()?;
        Ok(spec)
    }
}
