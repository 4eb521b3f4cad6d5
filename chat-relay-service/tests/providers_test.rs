//! HTTP providers against local stub upstreams.

use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chat_relay_service::models::Message;
use chat_relay_service::services::providers::gemini::{GeminiConfig, GeminiProvider};
use chat_relay_service::services::providers::openai_compat::{
    OpenAiCompatConfig, OpenAiCompatProvider,
};
use chat_relay_service::services::providers::{ChatProvider, ProviderError};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("Failed to bind stub upstream");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

fn openai(base_url: String) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(OpenAiCompatConfig {
        name: "groq".to_string(),
        api_key: Some("test-key".to_string()),
        base_url,
        model: "llama-3.3-70b-versatile".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn gemini(base_url: String) -> GeminiProvider {
    GeminiProvider::new(GeminiConfig {
        api_key: Some("test-key".to_string()),
        model: "gemini-flash-latest".to_string(),
        base_url,
        thinking: true,
        search: true,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn chat_completions(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-key");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }

    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last = messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_string();

    (
        StatusCode::OK,
        Json(json!({
            "model": body["model"],
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": format!("{} messages, last: {}", messages.len(), last)
                }
            }]
        })),
    )
}

#[tokio::test]
async fn openai_compatible_round_trip() {
    let base = serve(Router::new().route("/v1/chat/completions", post(chat_completions))).await;
    let provider = openai(format!("{}/v1", base));

    let history = vec![
        Message::user("hi"),
        Message::assistant("hello"),
        Message::user("what now"),
    ];
    let completion = provider.complete(&history, "be brief").await.unwrap();

    assert_eq!(completion.provider, "groq");
    assert_eq!(completion.model, "llama-3.3-70b-versatile");
    assert_eq!(completion.text, "4 messages, last: what now");
}

#[tokio::test]
async fn openai_compatible_rate_limit_maps_to_error() {
    let base = serve(Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    ))
    .await;

    let result = openai(format!("{}/v1", base))
        .complete(&[Message::user("hi")], "sys")
        .await;
    assert_eq!(result, Err(ProviderError::RateLimited));
}

#[tokio::test]
async fn openai_compatible_server_error_is_api_error() {
    let base = serve(Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
    ))
    .await;

    let result = openai(format!("{}/v1", base))
        .complete(&[Message::user("hi")], "sys")
        .await;
    assert!(matches!(result, Err(ProviderError::ApiError(msg)) if msg.contains("upstream down")));
}

async fn stream_generate(
    Path(target): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    assert_eq!(target, "gemini-flash-latest:streamGenerateContent");
    assert_eq!(
        headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()),
        Some("test-key")
    );
    assert_eq!(body["generationConfig"]["thinkingConfig"]["thinkingBudget"], -1);
    assert_eq!(body["contents"][0]["role"], "user");

    let events = [
        json!({"candidates": [{"content": {"parts": [{"text": "pondering", "thought": true}]}}]}),
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Hello, "}]}}]}),
        json!({"candidates": [{"content": {"parts": [{"text": "world"}]}, "finishReason": "STOP"}]}),
    ];
    let body: String = events
        .iter()
        .map(|e| format!("data: {}\r\n\r\n", e))
        .collect();

    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

#[tokio::test]
async fn gemini_streams_and_concatenates() {
    let base = serve(Router::new().route("/v1beta/models/:target", post(stream_generate))).await;
    let provider = gemini(format!("{}/v1beta", base));

    let completion = provider
        .complete(&[Message::user("hi")], "be brief")
        .await
        .unwrap();

    assert_eq!(completion.provider, "gemini");
    assert_eq!(completion.model, "gemini-flash-latest");
    assert_eq!(completion.text, "Hello, world");
}

#[tokio::test]
async fn gemini_error_status_fails_soft() {
    let base = serve(Router::new().route(
        "/v1beta/models/:target",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
    ))
    .await;

    let result = gemini(format!("{}/v1beta", base))
        .complete(&[Message::user("hi")], "sys")
        .await;
    assert!(matches!(result, Err(ProviderError::ApiError(_))));
}
