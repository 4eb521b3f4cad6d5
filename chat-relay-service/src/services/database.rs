//! SQLite storage for request analytics.
//!
//! One append-only `requests` table. Timestamps are UTC epoch milliseconds so
//! hour bucketing and range filters stay plain integer arithmetic.

use crate::models::{NewRequestRecord, RequestRecord};
use crate::services::metrics::{record_db_error, record_db_operation};
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Totals backing the overview endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverviewTotals {
    pub total: i64,
    pub successful: i64,
    pub total_tokens: i64,
    /// Mean response time over successful rows; `None` when there are none.
    pub avg_success_response_time: Option<f64>,
    pub since_count: i64,
    pub by_provider: Vec<(String, i64)>,
}

/// One (hour, provider) group of the timeline query.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TimelineRow {
    /// Start of the hour, epoch milliseconds.
    pub bucket_ms: i64,
    pub api_provider: String,
    pub requests: i64,
    pub tokens: i64,
    pub avg_response_time: Option<f64>,
}

/// Connection pool wrapper for the analytics database.
#[derive(Clone)]
pub struct AnalyticsDb {
    pool: SqlitePool,
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

impl AnalyticsDb {
    /// Open (creating if missing) the SQLite database at `url`.
    #[instrument]
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        info!("Opening analytics database");

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| db_error("Invalid database URL", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("Analytics database ready");

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }

    /// Close the pool; later operations fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Append one request row, returning its id.
    #[instrument(skip(self, record), fields(session_id = %record.session_id, success = record.success))]
    pub async fn insert_request(&self, record: &NewRequestRecord) -> Result<i64, AppError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO requests (
                timestamp, session_id, user_message, response_text, api_provider, model,
                tokens_prompt, tokens_completion, tokens_total, response_time, success, error_message
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.session_id)
        .bind(&record.user_message)
        .bind(&record.response_text)
        .bind(&record.api_provider)
        .bind(&record.model)
        .bind(record.tokens.prompt)
        .bind(record.tokens.completion)
        .bind(record.tokens.prompt + record.tokens.completion)
        .bind(record.response_time)
        .bind(record.success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            record_db_error("insert_request");
            db_error("Failed to insert request", e)
        })?;

        record_db_operation("insert_request", start.elapsed().as_secs_f64());

        Ok(result.last_insert_rowid())
    }

    /// Totals over all rows; `since_ms` bounds the recent-activity count.
    #[instrument(skip(self))]
    pub async fn overview_totals(&self, since_ms: i64) -> Result<OverviewTotals, AppError> {
        let start = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin read", e))?;

        let (total, successful, total_tokens, avg_success_response_time, since_count): (
            i64,
            i64,
            i64,
            Option<f64>,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN success THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(tokens_total), 0),
                AVG(CASE WHEN success THEN response_time END),
                COALESCE(SUM(CASE WHEN timestamp >= ? THEN 1 ELSE 0 END), 0)
            FROM requests
            "#,
        )
        .bind(since_ms)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            record_db_error("overview");
            db_error("Failed to aggregate requests", e)
        })?;

        let by_provider: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT api_provider, COUNT(*)
            FROM requests
            GROUP BY api_provider
            ORDER BY api_provider
            "#,
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            record_db_error("overview");
            db_error("Failed to group requests by provider", e)
        })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to end read", e))?;

        record_db_operation("overview", start.elapsed().as_secs_f64());

        Ok(OverviewTotals {
            total,
            successful,
            total_tokens,
            avg_success_response_time,
            since_count,
            by_provider,
        })
    }

    /// Rows since `since_ms` grouped by UTC hour and provider, oldest first.
    #[instrument(skip(self))]
    pub async fn timeline(&self, since_ms: i64) -> Result<Vec<TimelineRow>, AppError> {
        let start = Instant::now();

        let rows = sqlx::query_as::<_, TimelineRow>(
            r#"
            SELECT
                (timestamp / ?) * ? AS bucket_ms,
                api_provider,
                COUNT(*) AS requests,
                COALESCE(SUM(tokens_total), 0) AS tokens,
                AVG(response_time) AS avg_response_time
            FROM requests
            WHERE timestamp >= ?
            GROUP BY bucket_ms, api_provider
            ORDER BY bucket_ms ASC, api_provider ASC
            "#,
        )
        .bind(MILLIS_PER_HOUR)
        .bind(MILLIS_PER_HOUR)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            record_db_error("timeline");
            db_error("Failed to build timeline", e)
        })?;

        record_db_operation("timeline", start.elapsed().as_secs_f64());

        Ok(rows)
    }

    /// The `limit` newest rows, newest first.
    #[instrument(skip(self))]
    pub async fn recent(&self, limit: i64) -> Result<Vec<RequestRecord>, AppError> {
        let start = Instant::now();

        let rows = sqlx::query_as::<_, RequestRecord>(
            r#"
            SELECT id, timestamp, session_id, user_message, response_text, api_provider, model,
                   tokens_prompt, tokens_completion, tokens_total, response_time, success, error_message
            FROM requests
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            record_db_error("recent");
            db_error("Failed to list recent requests", e)
        })?;

        record_db_operation("recent", start.elapsed().as_secs_f64());

        Ok(rows)
    }

    pub async fn count_requests(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM requests")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count requests", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenUsage;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use tempfile::TempDir;

    async fn test_db() -> (AnalyticsDb, TempDir) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("analytics.db").display());
        let db = AnalyticsDb::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    fn success_at(provider: &str, at: chrono::DateTime<Utc>, seconds: f64) -> NewRequestRecord {
        NewRequestRecord::success(
            "default",
            "question",
            "answer",
            provider,
            "model",
            TokenUsage::new(2, 3),
            seconds,
        )
        .with_timestamp(at)
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let (db, _dir) = test_db().await;
        db.run_migrations().await.unwrap();
        db.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn insert_stores_token_total() {
        let (db, _dir) = test_db().await;
        db.insert_request(&success_at("groq", Utc::now(), 0.5))
            .await
            .unwrap();

        let rows = db.recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tokens_total, rows[0].tokens_prompt + rows[0].tokens_completion);
        assert_eq!(rows[0].tokens_total, 5);
        assert!(rows[0].success);
    }

    #[tokio::test]
    async fn overview_totals_on_empty_table() {
        let (db, _dir) = test_db().await;
        let totals = db.overview_totals(0).await.unwrap();
        assert_eq!(totals, OverviewTotals::default());
    }

    #[tokio::test]
    async fn timeline_groups_by_hour_and_provider() {
        let (db, _dir) = test_db().await;
        let hour = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();

        db.insert_request(&success_at("groq", hour + ChronoDuration::minutes(5), 1.0))
            .await
            .unwrap();
        db.insert_request(&success_at("groq", hour + ChronoDuration::minutes(50), 2.0))
            .await
            .unwrap();
        db.insert_request(&success_at("gemini", hour + ChronoDuration::minutes(20), 4.0))
            .await
            .unwrap();
        db.insert_request(&success_at("groq", hour + ChronoDuration::minutes(70), 1.0))
            .await
            .unwrap();

        let rows = db.timeline(hour.timestamp_millis()).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bucket_ms, hour.timestamp_millis());
        assert_eq!(rows[0].api_provider, "gemini");
        assert_eq!(rows[1].api_provider, "groq");
        assert_eq!(rows[1].requests, 2);
        assert_eq!(rows[1].tokens, 10);
        assert_eq!(rows[1].avg_response_time, Some(1.5));
        assert_eq!(
            rows[2].bucket_ms,
            (hour + ChronoDuration::hours(1)).timestamp_millis()
        );
    }

    #[tokio::test]
    async fn timeline_excludes_rows_before_window() {
        let (db, _dir) = test_db().await;
        let now = Utc::now();
        db.insert_request(&success_at("groq", now - ChronoDuration::hours(30), 1.0))
            .await
            .unwrap();
        db.insert_request(&success_at("groq", now - ChronoDuration::minutes(10), 1.0))
            .await
            .unwrap();

        let since = (now - ChronoDuration::hours(24)).timestamp_millis();
        let rows = db.timeline(since).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.requests).sum::<i64>(), 1);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let (db, _dir) = test_db().await;
        let base = Utc::now();
        for i in 0..5 {
            db.insert_request(&success_at("groq", base + ChronoDuration::seconds(i), 1.0))
                .await
                .unwrap();
        }

        let rows = db.recent(3).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].timestamp > rows[1].timestamp);
        assert!(rows[1].timestamp > rows[2].timestamp);
    }

    #[tokio::test]
    async fn insert_fails_after_close() {
        let (db, _dir) = test_db().await;
        db.close().await;
        let result = db.insert_request(&success_at("groq", Utc::now(), 1.0)).await;
        assert!(result.is_err());
    }
}
