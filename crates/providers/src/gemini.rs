//! Gemini provider: the single adapter between Folio and the upstream
//! generative-AI REST API.
//!
//! Everything upstream-specific stays in this file:
//! - request shape (`systemInstruction`, `contents[].parts[]`, `inlineData`)
//! - response normalization (candidate parts joined into one string)
//! - failure classification (HTTP status + typed error envelope → `ProviderError`)

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use folio_core::error::ProviderError;
use folio_core::prompt::{ContentPart, PromptPayload};
use folio_core::provider::{Generation, Provider};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Finish reasons that mean the reply was withheld for policy reasons.
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// A Gemini `generateContent` client.
pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new provider against `base_url` (e.g. `.../v1beta`).
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "gemini".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: 0.7,
            max_output_tokens: 1024,
            client,
        })
    }

    /// Build from the application config. Fails without a credential.
    pub fn from_config(config: &folio_config::AppConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .require_api_key()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;
        Ok(Self::new(api_key, &config.api_base_url)?
            .with_generation(config.temperature, config.max_output_tokens))
    }

    /// Override sampling temperature and output length.
    pub fn with_generation(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    /// Convert a prompt into the upstream request body.
    fn to_api_request(&self, prompt: &PromptPayload) -> ApiRequest {
        let parts = prompt
            .parts()
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => ApiPart {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                ContentPart::InlineMedia { data, mime_type } => ApiPart {
                    text: None,
                    inline_data: Some(ApiInlineData {
                        mime_type: mime_type.clone(),
                        data: BASE64.encode(data),
                    }),
                },
            })
            .collect();

        let system_instruction = if prompt.system_instruction().is_empty() {
            None
        } else {
            Some(ApiSystemInstruction {
                parts: vec![ApiPart {
                    text: Some(prompt.system_instruction().to_string()),
                    inline_data: None,
                }],
            })
        };

        ApiRequest {
            system_instruction,
            contents: vec![ApiContent {
                role: "user".into(),
                parts,
            }],
            generation_config: ApiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &PromptPayload,
    ) -> std::result::Result<Generation, ProviderError> {
        let body = self.to_api_request(prompt);

        debug!(
            provider = %self.name,
            model = %model,
            parts = prompt.parts().len(),
            has_media = prompt.has_media(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();

        if status != 200 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, model = %model, body = %error_body, "Provider returned error");
            return Err(classify_status(status, &error_body, model, retry_after_secs));
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::EmptyResponse(format!(
                "failed to parse response from '{model}': {e}"
            )))?;

        let text = extract_text(api_response, model)?;

        Ok(Generation {
            text,
            model: model.to_string(),
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-200 response to a typed failure.
///
/// The upstream error envelope (`{"error": {"status", "details"}}`) is used
/// where present; otherwise the HTTP status alone decides.
fn classify_status(
    status: u16,
    body: &str,
    model: &str,
    retry_after_secs: Option<u64>,
) -> ProviderError {
    let envelope = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let message = envelope
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    let upstream_status = envelope.as_ref().and_then(|e| e.status.as_deref());
    let key_invalid = envelope.as_ref().is_some_and(|e| {
        e.details
            .iter()
            .any(|d| d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID"))
    });

    match status {
        401 | 403 => ProviderError::AuthenticationFailed(message),
        400 if key_invalid => ProviderError::AuthenticationFailed(message),
        400 => ProviderError::InvalidRequest(message),
        404 => ProviderError::ModelNotFound(model.to_string()),
        429 if upstream_status == Some("RESOURCE_EXHAUSTED") && retry_after_secs.is_none() => {
            ProviderError::QuotaExceeded(message)
        }
        429 => ProviderError::RateLimited { retry_after_secs },
        408 | 500 | 502 | 503 | 504 => ProviderError::Unavailable {
            status_code: status,
            message,
        },
        _ => ProviderError::ApiError {
            status_code: status,
            message,
        },
    }
}

/// Normalize a successful response body into reply text.
fn extract_text(response: ApiResponse, model: &str) -> Result<String, ProviderError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|f| f.block_reason)
    {
        return Err(ProviderError::ContentBlocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::EmptyResponse(format!("no candidates from '{model}'")))?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if text.trim().is_empty() && BLOCKED_FINISH_REASONS.contains(&reason) {
            return Err(ProviderError::ContentBlocked(reason.to_string()));
        }
    }

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse(format!(
            "'{model}' returned no text"
        )));
    }

    Ok(text)
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiSystemInstruction>,
    contents: Vec<ApiContent>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct ApiSystemInstruction {
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
struct ApiContent {
    role: String,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<ApiInlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ApiResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Thinking models mark their reasoning parts; those are not the reply.
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}
