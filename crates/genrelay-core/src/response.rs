//! Response envelope decoding and content extraction.
//!
//! The upstream response is a list of candidates, each holding an ordered
//! list of content parts. Every raw part is decoded into exactly one
//! `ResponsePart` variant, so extraction is a match over a closed set
//! instead of probing optional fields.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::request::{Capability, InlineBlob};

/// Errors from extracting usable content out of a response.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No {capability} part in response ({candidates} candidates, finish reason {finish_reason:?}, block reason {block_reason:?})")]
    NoMatchingPart {
        capability: Capability,
        candidates: usize,
        finish_reason: Option<String>,
        block_reason: Option<String>,
    },

    #[error("Generated content is not text")]
    NotText,

    #[error("Generated text is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// One decoded content part.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawPart")]
pub enum ResponsePart {
    /// Answer text
    Text(String),

    /// Model reasoning text, never returned as the answer
    Thought(String),

    /// Base64-decoded inline binary data
    InlineData(InlineBlob),

    /// Anything else (function calls, citations, undecodable data)
    Unknown,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    inline_data: Option<RawBlob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlob {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    data: String,
}

impl From<RawPart> for ResponsePart {
    fn from(raw: RawPart) -> Self {
        if let Some(blob) = raw.inline_data {
            return match InlineBlob::from_base64(blob.mime_type, &blob.data) {
                Ok(blob) => ResponsePart::InlineData(blob),
                Err(e) => {
                    tracing::debug!(error = %e, "Inline data is not valid base64");
                    ResponsePart::Unknown
                }
            };
        }

        match raw.text {
            Some(text) if raw.thought => ResponsePart::Thought(text),
            Some(text) => ResponsePart::Text(text),
            None => ResponsePart::Unknown,
        }
    }
}

/// Content of a candidate.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,

    #[serde(default)]
    pub role: Option<String>,
}

/// One candidate answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,

    /// Why generation stopped (e.g. "STOP", "SAFETY")
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl Candidate {
    /// Build a candidate from parts.
    pub fn from_parts(parts: Vec<ResponsePart>) -> Self {
        Self {
            content: Some(CandidateContent {
                parts,
                role: Some("model".to_string()),
            }),
            finish_reason: Some("STOP".to_string()),
        }
    }

    /// Parts of this candidate (empty if the content is missing).
    pub fn parts(&self) -> &[ResponsePart] {
        self.content
            .as_ref()
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }
}

/// Feedback about the prompt itself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// A decoded response envelope.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,

    #[serde(default)]
    pub model_version: Option<String>,
}

impl ResponseEnvelope {
    /// Envelope with a single candidate holding the given parts.
    pub fn from_parts(parts: Vec<ResponsePart>) -> Self {
        Self {
            candidates: vec![Candidate::from_parts(parts)],
            ..Default::default()
        }
    }

    /// Decode an envelope from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn block_reason(&self) -> Option<String> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
    }
}

/// Content extracted from a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedContent {
    Text(String),
    Image(InlineBlob),
    Audio(InlineBlob),
}

impl GeneratedContent {
    /// Text, if this is a text result.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            GeneratedContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Blob, if this is an image or audio result.
    pub fn as_blob(&self) -> Option<&InlineBlob> {
        match self {
            GeneratedContent::Image(blob) | GeneratedContent::Audio(blob) => Some(blob),
            GeneratedContent::Text(_) => None,
        }
    }

    /// `data:` URL for binary results.
    pub fn to_data_url(&self) -> Option<String> {
        self.as_blob().map(InlineBlob::to_data_url)
    }

    /// Parse a structured-output text result.
    ///
    /// Tolerates a surrounding Markdown code fence.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, ExtractionError> {
        let text = self.as_text().ok_or(ExtractionError::NotText)?;
        Ok(serde_json::from_str(strip_code_fence(text))?)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// Locate the content matching `capability` in an envelope.
///
/// - Text: the first candidate with non-blank answer text; its text parts
///   are joined in order.
/// - Image/Audio: the first inline blob, scanning candidates then parts in
///   order, whose MIME type matches the modality (or is empty).
pub fn extract(
    envelope: &ResponseEnvelope,
    capability: Capability,
) -> Result<GeneratedContent, ExtractionError> {
    let found = match capability {
        Capability::Text => extract_text(envelope).map(GeneratedContent::Text),
        Capability::Image => extract_blob(envelope, capability).map(GeneratedContent::Image),
        Capability::Audio => extract_blob(envelope, capability).map(GeneratedContent::Audio),
    };

    found.ok_or_else(|| ExtractionError::NoMatchingPart {
        capability,
        candidates: envelope.candidates.len(),
        finish_reason: envelope
            .candidates
            .iter()
            .find_map(|c| c.finish_reason.clone()),
        block_reason: envelope.block_reason(),
    })
}

fn extract_text(envelope: &ResponseEnvelope) -> Option<String> {
    envelope.candidates.iter().find_map(|candidate| {
        let text: String = candidate
            .parts()
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!text.trim().is_empty()).then_some(text)
    })
}

fn extract_blob(envelope: &ResponseEnvelope, capability: Capability) -> Option<InlineBlob> {
    let prefix = capability.mime_prefix()?;
    envelope
        .candidates
        .iter()
        .flat_map(|candidate| candidate.parts())
        .find_map(|part| match part {
            ResponsePart::InlineData(blob)
                if !blob.is_empty()
                    && (blob.mime_type.is_empty() || blob.mime_type.starts_with(prefix)) =>
            {
                Some(blob.clone())
            }
            _ => None,
        })
}
