//! Prometheus metrics for the chat relay.
//!
//! HTTP request metrics come from `service_core::middleware::metrics`; this
//! module adds provider and analytics metrics and owns the exporter handle.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
            tracing::info!("Prometheus metrics initialized");
        }
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record a provider call that produced a completion.
pub fn record_provider_success(provider: &str, duration_secs: f64) {
    let provider = provider.to_string();
    counter!("chat_provider_requests_total", "provider" => provider.clone(), "outcome" => "success")
        .increment(1);
    histogram!("chat_provider_latency_seconds", "provider" => provider).record(duration_secs);
}

/// Record a failed provider call.
pub fn record_provider_error(provider: &str, error_type: &'static str) {
    counter!(
        "chat_provider_requests_total",
        "provider" => provider.to_string(),
        "outcome" => "error",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record estimated token usage of an answered turn.
pub fn record_tokens(provider: &str, prompt: i64, completion: i64) {
    let provider = provider.to_string();
    counter!("chat_tokens_estimated_total", "provider" => provider.clone(), "type" => "prompt")
        .increment(prompt.max(0) as u64);
    counter!("chat_tokens_estimated_total", "provider" => provider, "type" => "completion")
        .increment(completion.max(0) as u64);
}

/// Record a finished chat turn.
pub fn record_turn(outcome: &'static str) {
    counter!("chat_turns_total", "outcome" => outcome).increment(1);
}

/// Record a database operation duration.
pub fn record_db_operation(operation: &'static str, duration_secs: f64) {
    histogram!("db_operation_duration_seconds", "operation" => operation).record(duration_secs);
}

/// Record a database error.
pub fn record_db_error(operation: &'static str) {
    counter!("db_errors_total", "operation" => operation).increment(1);
}
