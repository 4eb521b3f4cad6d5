#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{request::Builder, Request, Response, StatusCode},
    Router,
};
use chat_relay_service::{
    build_router,
    services::{
        providers::ChatProvider, AnalyticsDb, AnalyticsRecorder, ChatService, ConversationStore,
    },
    AppState,
};
use service_core::middleware::rate_limit::create_cooldown_limiter;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

/// Router over a throwaway SQLite file, with the given providers and cooldown.
pub async fn spawn_router(providers: Vec<Arc<dyn ChatProvider>>, cooldown: Duration) -> TestApp {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("analytics.db").display());
    let db = AnalyticsDb::connect(&url)
        .await
        .expect("Failed to open database");
    db.run_migrations().await.expect("Failed to run migrations");

    let chat = ChatService::new(
        ConversationStore::new(),
        providers,
        "You are a test assistant.",
        AnalyticsRecorder::new(db.clone()),
    );
    let state = AppState::new(chat, db, create_cooldown_limiter(cooldown, false));

    TestApp {
        router: build_router(state.clone()),
        state,
        _dir: dir,
    }
}

/// POST builder for `uri` arriving from the socket peer `client_ip`.
pub fn post_from(uri: &str, client_ip: &str) -> Builder {
    let ip: IpAddr = client_ip.parse().expect("Invalid client IP");
    Request::builder()
        .method("POST")
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::new(ip, 40_000)))
}

impl TestApp {
    pub async fn post_json(&self, uri: &str, body: &str, client_ip: &str) -> Response<Body> {
        self.send(
            post_from(uri, client_ip)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

pub async fn json_body(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
}
