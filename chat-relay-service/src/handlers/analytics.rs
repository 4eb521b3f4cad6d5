//! Analytics read endpoints.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::models::{Overview, RecentRequest, TimelineBucket};
use crate::services::analytics::{DEFAULT_RECENT_LIMIT, DEFAULT_TIMELINE_HOURS};
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub hours: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

pub async fn analytics_overview(State(state): State<AppState>) -> Result<Json<Overview>, AppError> {
    let overview = state.analytics.overview(Utc::now()).await?;
    Ok(Json(overview))
}

pub async fn analytics_timeline(
    State(state): State<AppState>,
    query: Result<Query<TimelineQuery>, QueryRejection>,
) -> Result<Json<Vec<TimelineBucket>>, AppError> {
    let Query(query) = query?;
    let hours = query.hours.unwrap_or(DEFAULT_TIMELINE_HOURS);
    let timeline = state.analytics.timeline(hours, Utc::now()).await?;
    Ok(Json(timeline))
}

pub async fn analytics_recent(
    State(state): State<AppState>,
    query: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<RecentRequest>>, AppError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let recent = state.analytics.recent(limit).await?;
    Ok(Json(recent))
}
