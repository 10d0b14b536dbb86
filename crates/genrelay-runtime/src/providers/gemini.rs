//! Google Gemini `generateContent` provider.
//!
//! One call is one POST to `{base_url}/models/{model}:generateContent`,
//! authenticated with the `x-goog-api-key` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

use genrelay_core::{Capability, InlineBlob, RequestSpec, ResponseEnvelope, SafetySetting};

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    GenerativeProvider, ProviderError, GEMINI_API_KEY_ENVS,
};

/// Public Gemini API endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment override for the endpoint.
pub const BASE_URL_ENV: &str = "GENRELAY_BASE_URL";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Gemini provider handle.
///
/// Owns its own `reqwest::Client`; clone the `Arc` to share it.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider with an explicit key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::build(
            ApiCredential::new(api_key, CredentialSource::Programmatic, "Gemini API key"),
            DEFAULT_GEMINI_BASE_URL.to_string(),
            DEFAULT_TIMEOUT,
        )
    }

    /// Create from `GEMINI_API_KEY` or `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(&GEMINI_API_KEY_ENVS, "Gemini API key")?;
        Self::build(credential, env_base_url(), DEFAULT_TIMEOUT)
    }

    /// Create from JSON configuration with environment fallback.
    ///
    /// ```json
    /// {
    ///   "api_key": "AIza...",      // optional, falls back to GEMINI_API_KEY / GOOGLE_API_KEY
    ///   "base_url": "https://...", // optional, falls back to GENRELAY_BASE_URL
    ///   "timeout": "60s"           // optional, humantime duration per request
    /// }
    /// ```
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            &GEMINI_API_KEY_ENVS,
            "Gemini API key",
        )?;

        let base_url = config["base_url"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(env_base_url);

        let timeout = parse_timeout(config)?.unwrap_or(DEFAULT_TIMEOUT);

        Self::build(credential, base_url, timeout)
    }

    fn build(
        credential: ApiCredential,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

fn env_base_url() -> String {
    std::env::var(BASE_URL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
}

fn parse_timeout(config: &JsonValue) -> Result<Option<Duration>, ProviderError> {
    match &config["timeout"] {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) => humantime::parse_duration(s)
            .map(Some)
            .map_err(|e| ProviderError::NotConfigured(format!("timeout '{}': {}", s, e))),
        JsonValue::Number(n) => n
            .as_u64()
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| ProviderError::NotConfigured("timeout must be positive".to_string())),
        _ => Err(ProviderError::NotConfigured(
            "timeout must be a duration string such as \"60s\"".to_string(),
        )),
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: WireBlob,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

impl From<&InlineBlob> for WirePart {
    fn from(blob: &InlineBlob) -> Self {
        WirePart::InlineData {
            inline_data: WireBlob {
                mime_type: blob.mime_type.clone(),
                data: blob.to_base64(),
            },
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig<'a> {
    aspect_ratio: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

impl WireGenerationConfig<'_> {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.response_mime_type.is_none()
            && self.response_schema.is_none()
            && self.response_modalities.is_empty()
            && self.image_config.is_none()
            && self.speech_config.is_none()
    }
}

/// Map a spec onto the wire request.
fn wire_request(spec: &RequestSpec) -> GenerateContentRequest<'_> {
    let payload = &spec.payload;
    let settings = &spec.settings;

    let mut parts: Vec<WirePart> = payload.reference_images.iter().map(WirePart::from).collect();
    parts.push(WirePart::Text {
        text: payload.prompt.clone(),
    });

    let system_instruction = payload.system_instruction.as_ref().map(|text| WireContent {
        role: None,
        parts: vec![WirePart::Text { text: text.clone() }],
    });

    let config = WireGenerationConfig {
        temperature: settings.temperature,
        response_mime_type: settings.response_mime_type.as_deref(),
        response_schema: payload.response_schema.as_ref(),
        response_modalities: spec.capability.response_modality().into_iter().collect(),
        image_config: match spec.capability {
            Capability::Image => settings
                .aspect_ratio
                .as_deref()
                .map(|aspect_ratio| ImageConfig { aspect_ratio }),
            _ => None,
        },
        speech_config: match spec.capability {
            Capability::Audio => settings.voice.as_deref().map(|voice_name| SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
                },
            }),
            _ => None,
        },
    };

    GenerateContentRequest {
        contents: vec![WireContent {
            role: Some("user"),
            parts,
        }],
        system_instruction,
        generation_config: (!config.is_empty()).then_some(config),
        safety_settings: settings.safety_settings.clone(),
    }
}

/// Google error body: `{"error": {"code", "message", "status"}}`, sometimes
/// wrapped in a one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GoogleErrorBody {
    Single(GoogleError),
    Batch(Vec<GoogleError>),
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleErrorBody {
    fn into_detail(self) -> Option<GoogleErrorDetail> {
        match self {
            GoogleErrorBody::Single(e) => Some(e.error),
            GoogleErrorBody::Batch(errors) => errors.into_iter().next().map(|e| e.error),
        }
    }
}

fn error_from_body(status: u16, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(GoogleErrorBody::into_detail);

    match (detail, status) {
        (Some(detail), _) => ProviderError::Api {
            status,
            code: detail.status,
            message: detail.message,
        },
        (None, 401) => ProviderError::Auth(body.to_string()),
        (None, 429) => ProviderError::RateLimited { retry_after },
        (None, _) => ProviderError::Api {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

/// The request URL is dropped so base URLs and model names never feed
/// message classification.
fn transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Http(format!("network error: {}", error.without_url()))
    }
}

#[async_trait]
impl GenerativeProvider for GeminiProvider {
    async fn generate(
        &self,
        model: &str,
        spec: &RequestSpec,
    ) -> Result<ResponseEnvelope, ProviderError> {
        let request = wire_request(spec);

        // Expose the credential only here, at the point of use
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.credential.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), retry_after, &body));
        }

        ResponseEnvelope::from_json(&body).map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
            && (self.base_url.starts_with("https://") || self.base_url.starts_with("http://"))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for creating Gemini providers from configuration.
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn GenerativeProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", &GEMINI_API_KEY_ENVS) {
            return Err(ProviderError::NotConfigured(format!(
                "Gemini API key required: set 'api_key' in config or one of {:?}",
                GEMINI_API_KEY_ENVS
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        parse_timeout(config).map(|_| ())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": DEFAULT_GEMINI_BASE_URL,
            "timeout": "60s"
        })
    }

    fn description(&self) -> &'static str {
        "Google Gemini generateContent provider"
    }
}
