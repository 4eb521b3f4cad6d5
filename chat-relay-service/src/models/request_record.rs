//! Analytics rows: one per completed or failed chat attempt.

use super::TokenUsage;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Provider/model label for turns where no provider produced output.
pub const NO_PROVIDER: &str = "none";

/// Provider/model label for turns aborted by an unhandled failure.
pub const ERROR_PROVIDER: &str = "error";

/// Error message recorded when every provider failed.
pub const ALL_PROVIDERS_UNAVAILABLE: &str = "all providers unavailable";

/// A stored request row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RequestRecord {
    pub id: i64,
    /// Milliseconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub session_id: String,
    pub user_message: String,
    pub response_text: Option<String>,
    pub api_provider: String,
    pub model: String,
    pub tokens_prompt: i64,
    pub tokens_completion: i64,
    pub tokens_total: i64,
    pub response_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl RequestRecord {
    pub fn recorded_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }
}

/// A request row before insertion.
#[derive(Debug, Clone)]
pub struct NewRequestRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub user_message: String,
    pub response_text: Option<String>,
    pub api_provider: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub response_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewRequestRecord {
    /// A turn answered by `api_provider`.
    pub fn success(
        session_id: &str,
        user_message: &str,
        response_text: &str,
        api_provider: &str,
        model: &str,
        tokens: TokenUsage,
        response_time: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            response_text: Some(response_text.to_string()),
            api_provider: api_provider.to_string(),
            model: model.to_string(),
            tokens: TokenUsage::new(tokens.prompt, tokens.completion),
            response_time,
            success: true,
            error_message: None,
        }
    }

    /// A turn that produced no answer. Only prompt tokens are counted.
    pub fn failure(
        session_id: &str,
        user_message: &str,
        label: &str,
        error_message: &str,
        response_time: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            user_message: user_message.to_string(),
            response_text: None,
            api_provider: label.to_string(),
            model: label.to_string(),
            tokens: TokenUsage::estimate(user_message, ""),
            response_time,
            success: false,
            error_message: Some(error_message.to_string()),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
