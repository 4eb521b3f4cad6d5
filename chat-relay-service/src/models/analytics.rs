//! Read models served by the analytics endpoints.

use super::RequestRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Maximum characters of a user message shown in the recent-request listing.
pub const PREVIEW_CHARS: usize = 100;

/// Aggregate statistics across all recorded requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub total_requests: i64,
    pub successful_requests: i64,
    pub failed_requests: i64,
    /// Percentage, one decimal place.
    pub success_rate: f64,
    pub total_tokens: i64,
    /// Mean seconds over successful requests, two decimal places.
    pub avg_response_time: f64,
    pub requests_by_provider: BTreeMap<String, i64>,
    pub requests_last_24h: i64,
}

/// Requests for one provider within one UTC hour.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBucket {
    /// `YYYY-MM-DD HH:00`, UTC.
    pub hour: String,
    pub api_provider: String,
    pub requests: i64,
    pub tokens: i64,
    pub avg_response_time: f64,
}

/// One row of the recent-request listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentRequest {
    pub id: i64,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub session_id: String,
    pub user_message: String,
    pub response_length: usize,
    pub api_provider: String,
    pub model: String,
    pub tokens_total: i64,
    pub response_time: f64,
    pub success: bool,
    pub error_message: Option<String>,
}

impl From<RequestRecord> for RecentRequest {
    fn from(record: RequestRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.recorded_at().to_rfc3339(),
            user_message: truncate_preview(&record.user_message),
            response_length: record
                .response_text
                .as_deref()
                .map(|t| t.chars().count())
                .unwrap_or(0),
            session_id: record.session_id,
            api_provider: record.api_provider,
            model: record.model,
            tokens_total: record.tokens_total,
            response_time: record.response_time,
            success: record.success,
            error_message: record.error_message,
        }
    }
}

/// Cut `text` to [`PREVIEW_CHARS`] characters, appending `...` when anything was dropped.
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `part / whole * 100`, one decimal; zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, 1)
}
