//! Chat turn orchestration: history, provider fallback and recording.

use crate::models::analytics::round_to;
use crate::models::request_record::{ALL_PROVIDERS_UNAVAILABLE, ERROR_PROVIDER, NO_PROVIDER};
use crate::models::{Message, NewRequestRecord, TokenUsage};
use crate::services::analytics::AnalyticsRecorder;
use crate::services::conversation::ConversationStore;
use crate::services::metrics::{
    record_provider_error, record_provider_success, record_tokens, record_turn,
};
use crate::services::providers::ChatProvider;
use serde::Serialize;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("No message provided")]
    EmptyMessage,

    #[error("All AI providers are currently unavailable")]
    AllProvidersUnavailable,
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            ChatError::AllProvidersUnavailable => AppError::ProviderUnavailable(err.to_string()),
        }
    }
}

/// Body returned for an answered turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub response: String,
    pub session_id: String,
    pub api_provider: String,
    pub model: String,
    /// Seconds, two decimal places.
    pub response_time: f64,
    pub tokens: TokenUsage,
}

/// Runs chat turns against an ordered list of providers.
pub struct ChatService {
    store: ConversationStore,
    providers: Vec<Arc<dyn ChatProvider>>,
    system_instruction: String,
    recorder: AnalyticsRecorder,
}

impl ChatService {
    /// `providers` are tried in the given order.
    pub fn new(
        store: ConversationStore,
        providers: Vec<Arc<dyn ChatProvider>>,
        system_instruction: impl Into<String>,
        recorder: AnalyticsRecorder,
    ) -> Self {
        Self {
            store,
            providers,
            system_instruction: system_instruction.into(),
            recorder,
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run one turn for `session_id`.
    ///
    /// The session stays locked until the turn is finished, so concurrent
    /// turns on one session observe each other's messages in order.
    pub async fn handle_turn(&self, session_id: &str, message: &str) -> Result<ChatTurn, ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut history = self.store.lock(session_id).await;
        let start = Instant::now();
        history.push(Message::user(message));

        for provider in &self.providers {
            let attempt = Instant::now();
            match provider.complete(&history, &self.system_instruction).await {
                Ok(completion) => {
                    record_provider_success(provider.name(), attempt.elapsed().as_secs_f64());
                    history.push(Message::assistant(&completion.text));
                    drop(history);

                    let response_time = round_to(start.elapsed().as_secs_f64(), 2);
                    let tokens = TokenUsage::estimate(message, &completion.text);
                    record_tokens(&completion.provider, tokens.prompt, tokens.completion);
                    record_turn("success");

                    tracing::info!(
                        session_id = %session_id,
                        provider = %completion.provider,
                        model = %completion.model,
                        response_time,
                        "Chat turn answered"
                    );

                    self.recorder
                        .record(NewRequestRecord::success(
                            session_id,
                            message,
                            &completion.text,
                            &completion.provider,
                            &completion.model,
                            tokens,
                            response_time,
                        ))
                        .await;

                    return Ok(ChatTurn {
                        response: completion.text,
                        session_id: session_id.to_string(),
                        api_provider: completion.provider,
                        model: completion.model,
                        response_time,
                        tokens,
                    });
                }
                Err(e) => {
                    record_provider_error(provider.name(), e.kind());
                    tracing::warn!(
                        session_id = %session_id,
                        provider = %provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                }
            }
        }
        drop(history);

        let response_time = round_to(start.elapsed().as_secs_f64(), 2);
        record_turn("unavailable");
        tracing::error!(session_id = %session_id, "All providers failed");

        self.recorder
            .record(NewRequestRecord::failure(
                session_id,
                message,
                NO_PROVIDER,
                ALL_PROVIDERS_UNAVAILABLE,
                response_time,
            ))
            .await;

        Err(ChatError::AllProvidersUnavailable)
    }

    /// Record a turn that was aborted by an unexpected failure.
    pub async fn record_unhandled(
        &self,
        session_id: &str,
        message: &str,
        error: &str,
        elapsed_secs: f64,
    ) {
        record_turn("error");
        self.recorder
            .record(NewRequestRecord::failure(
                session_id,
                message,
                ERROR_PROVIDER,
                error,
                round_to(elapsed_secs, 2),
            ))
            .await;
    }
}
