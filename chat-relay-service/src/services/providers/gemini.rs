//! Gemini provider implementation.
//!
//! Used as the fallback backend. Calls `streamGenerateContent` with SSE
//! framing and concatenates the streamed text into a single response.

use super::sse::event_stream;
use super::{status_error, ChatProvider, Completion, ProviderError};
use crate::models::{Message, Role};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Lazy, finite stream of response text pieces for one call.
pub type TextChunkStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Request an unbounded thinking budget.
    pub thinking: bool,
    /// Attach the Google Search grounding tool.
    pub search: bool,
    pub timeout: Duration,
}

pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    pub const NAME: &'static str = "gemini";

    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(&self, history: &[Message], system_instruction: &str) -> GenerateContentRequest {
        let contents = history
            .iter()
            .map(|m| Content {
                role: Some(
                    match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            }),
            generation_config: self.config.thinking.then(|| GenerationConfig {
                thinking_config: ThinkingConfig {
                    thinking_budget: -1,
                },
            }),
            tools: self.config.search.then(|| {
                vec![Tool {
                    google_search: GoogleSearch {},
                }]
            }),
        }
    }

    /// Open the streaming call and expose its text pieces.
    async fn stream_text(
        &self,
        history: &[Message],
        system_instruction: &str,
    ) -> Result<TextChunkStream, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("Gemini API key not configured".to_string())
        })?;

        let request = self.build_request(history, system_instruction);

        tracing::debug!(
            model = %self.config.model,
            messages = history.len(),
            thinking = self.config.thinking,
            search = self.config.search,
            "Starting streaming request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(Self::NAME, response).await);
        }

        let events = event_stream(Box::pin(response.bytes_stream()));
        Ok(Box::pin(text_chunks(events)))
    }
}

/// Decode event payloads into text pieces, skipping thought summaries.
pub fn text_chunks<S>(events: S) -> impl Stream<Item = Result<String, ProviderError>>
where
    S: Stream<Item = Result<String, ProviderError>>,
{
    events.filter_map(|event| async move {
        let data = match event {
            Ok(data) => data,
            Err(e) => return Some(Err(e)),
        };
        let chunk: GenerateContentResponse = match serde_json::from_str(&data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable Gemini stream event");
                return None;
            }
        };
        if let Some(error) = chunk.error {
            return Some(Err(ProviderError::ApiError(format!(
                "Gemini stream error {}: {}",
                error.code.unwrap_or_default(),
                error.message.unwrap_or_default()
            ))));
        }

        let text: String = chunk
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|p| !p.thought.unwrap_or(false))
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        (!text.is_empty()).then_some(Ok(text))
    })
}

/// Concatenate a chunk stream, failing on the first error or when nothing was produced.
pub async fn collect_text<S>(chunks: S) -> Result<String, ProviderError>
where
    S: Stream<Item = Result<String, ProviderError>>,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?);
    }
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn complete(
        &self,
        history: &[Message],
        system_instruction: &str,
    ) -> Result<Completion, ProviderError> {
        let chunks = self.stream_text(history, system_instruction).await?;
        let text = collect_text(chunks).await?;

        Ok(Completion {
            text,
            provider: Self::NAME.to_string(),
            model: self.config.model.clone(),
        })
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<i32>,
    #[serde(default)]
    message: Option<String>,
}
