//! LLM provider abstractions and implementations.
//!
//! Providers are tried in priority order by the chat service. A provider never
//! panics or propagates past its boundary: every failure, including a missing
//! credential, comes back as a [`ProviderError`] so the caller can move on to
//! the next provider.

pub mod gemini;
pub mod mock;
pub mod openai_compat;
pub mod sse;

use crate::models::Message;
use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Timeout => "timeout",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::EmptyResponse => "empty_response",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// A chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider label recorded in analytics (e.g. `groq`).
    fn name(&self) -> &str;

    /// Complete the conversation `history` under `system_instruction`.
    async fn complete(
        &self,
        history: &[Message],
        system_instruction: &str,
    ) -> Result<Completion, ProviderError>;
}

/// Map a non-success HTTP status to a provider error.
pub(crate) async fn status_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    if status.as_u16() == 429 {
        return ProviderError::RateLimited;
    }
    let error_text = response.text().await.unwrap_or_default();
    ProviderError::ApiError(format!("{} API error {}: {}", provider, status, error_text))
}
