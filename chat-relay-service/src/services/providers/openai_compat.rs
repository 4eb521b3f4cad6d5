//! OpenAI-compatible chat completion provider.
//!
//! Used as the primary backend (Groq by default). The system instruction is
//! sent as the first message, followed by the session history in order.

use super::{status_error, ChatProvider, Completion, ProviderError};
use crate::models::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI-compatible provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Label recorded in analytics.
    pub name: String,
    pub api_key: Option<String>,
    /// Base URL without the trailing `/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ProviderError> {
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
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

/// Build the request body: system instruction first, then history in order.
fn build_request(model: &str, history: &[Message], system_instruction: &str) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_instruction.to_string(),
    });
    messages.extend(history.iter().map(|m| ChatMessage {
        role: m.role.as_str().to_string(),
        content: m.content.clone(),
    }));

    ChatRequest {
        model: model.to_string(),
        messages,
        stream: false,
    }
}

fn extract_text(response: ChatResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(
        &self,
        history: &[Message],
        system_instruction: &str,
    ) -> Result<Completion, ProviderError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("{} API key not configured", self.config.name))
        })?;

        let request = build_request(&self.config.model, history, system_instruction);

        tracing::debug!(
            provider = %self.config.name,
            model = %self.config.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(&self.config.name, response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let model = body.model.clone().unwrap_or_else(|| self.config.model.clone());
        let text = extract_text(body).ok_or(ProviderError::EmptyResponse)?;

        Ok(Completion {
            text,
            provider: self.config.name.clone(),
            model,
        })
    }
}

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
