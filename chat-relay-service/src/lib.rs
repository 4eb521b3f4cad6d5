pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

use axum::{
    http::{header, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{cooldown_rate_limit_middleware, SharedCooldownLimiter},
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::services::{AnalyticsDb, AnalyticsQueryService, ChatService};

/// Process-scoped state shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub analytics: AnalyticsQueryService,
    pub db: AnalyticsDb,
    pub chat_limiter: SharedCooldownLimiter,
}

impl AppState {
    pub fn new(chat: ChatService, db: AnalyticsDb, chat_limiter: SharedCooldownLimiter) -> Self {
        Self {
            chat: Arc::new(chat),
            analytics: AnalyticsQueryService::new(db.clone()),
            db,
            chat_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Only the chat endpoint is throttled.
    let chat_route = Router::new()
        .route("/api/chat", post(handlers::chat))
        .layer(from_fn_with_state(
            state.chat_limiter.clone(),
            cooldown_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/api/clear", post(handlers::clear_conversation))
        .route("/api/analytics/overview", get(handlers::analytics_overview))
        .route("/api/analytics/timeline", get(handlers::analytics_timeline))
        .route("/api/analytics/recent", get(handlers::analytics_recent))
        .merge(chat_route)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
}
