//! Request analytics: best-effort recording and read-only aggregation.

use crate::models::analytics::{percentage, round_to};
use crate::models::{NewRequestRecord, Overview, RecentRequest, TimelineBucket};
use crate::services::database::AnalyticsDb;
use chrono::{DateTime, Duration, TimeZone, Utc};
use service_core::error::AppError;

pub const DEFAULT_TIMELINE_HOURS: i64 = 24;
pub const MAX_TIMELINE_HOURS: i64 = 720;
pub const DEFAULT_RECENT_LIMIT: i64 = 50;
pub const MAX_RECENT_LIMIT: i64 = 500;

/// Writes one row per finished chat attempt.
///
/// Storage failures are logged and swallowed: analytics must never fail a
/// chat response.
#[derive(Clone)]
pub struct AnalyticsRecorder {
    db: AnalyticsDb,
}

impl AnalyticsRecorder {
    pub fn new(db: AnalyticsDb) -> Self {
        Self { db }
    }

    /// Persist `record`, returning the new row id when the write succeeded.
    pub async fn record(&self, record: NewRequestRecord) -> Option<i64> {
        match self.db.insert_request(&record).await {
            Ok(id) => {
                tracing::debug!(
                    id,
                    session_id = %record.session_id,
                    success = record.success,
                    "Recorded request"
                );
                Some(id)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    session_id = %record.session_id,
                    success = record.success,
                    "Failed to record request analytics"
                );
                None
            }
        }
    }
}

/// Read-only aggregations over recorded requests.
#[derive(Clone)]
pub struct AnalyticsQueryService {
    db: AnalyticsDb,
}

impl AnalyticsQueryService {
    pub fn new(db: AnalyticsDb) -> Self {
        Self { db }
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> Result<Overview, AppError> {
        let since = (now - Duration::hours(24)).timestamp_millis();
        let totals = self.db.overview_totals(since).await?;

        Ok(Overview {
            total_requests: totals.total,
            successful_requests: totals.successful,
            failed_requests: totals.total - totals.successful,
            success_rate: percentage(totals.successful, totals.total),
            total_tokens: totals.total_tokens,
            avg_response_time: round_to(totals.avg_success_response_time.unwrap_or(0.0), 2),
            requests_by_provider: totals.by_provider.into_iter().collect(),
            requests_last_24h: totals.since_count,
        })
    }

    /// Hourly buckets per provider over the last `hours` (clamped to 1..=720).
    pub async fn timeline(
        &self,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimelineBucket>, AppError> {
        let hours = hours.clamp(1, MAX_TIMELINE_HOURS);
        let since = (now - Duration::hours(hours)).timestamp_millis();
        let rows = self.db.timeline(since).await?;

        Ok(rows
            .into_iter()
            .map(|row| TimelineBucket {
                hour: format_hour(row.bucket_ms),
                api_provider: row.api_provider,
                requests: row.requests,
                tokens: row.tokens,
                avg_response_time: round_to(row.avg_response_time.unwrap_or(0.0), 2),
            })
            .collect())
    }

    /// The newest `limit` requests (clamped to 1..=500), newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<RecentRequest>, AppError> {
        let limit = limit.clamp(1, MAX_RECENT_LIMIT);
        let rows = self.db.recent(limit).await?;
        Ok(rows.into_iter().map(RecentRequest::from).collect())
    }
}

fn format_hour(bucket_ms: i64) -> String {
    Utc.timestamp_millis_opt(bucket_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:00").to_string())
        .unwrap_or_default()
}
