//! Application startup and lifecycle management.

use crate::config::ChatRelayConfig;
use crate::services::providers::gemini::{GeminiConfig, GeminiProvider};
use crate::services::providers::openai_compat::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::services::providers::ChatProvider;
use crate::services::{AnalyticsDb, AnalyticsRecorder, ChatService, ConversationStore};
use crate::{build_router, AppState};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_cooldown_limiter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

/// Label of the OpenAI-compatible primary provider.
pub const PRIMARY_PROVIDER_NAME: &str = "groq";

/// Providers in fallback order: the OpenAI-compatible backend, then Gemini.
///
/// The `api_provider` label on turns and analytics rows follows the role:
/// `groq` is always the primary (`GROQ_*` settings) and `gemini` always the
/// secondary (`GEMINI_*` settings), whatever upstream the base URLs point at.
///
/// Both are always registered; one without a credential fails soft on every
/// call and the next provider is tried.
pub fn build_providers(config: &ChatRelayConfig) -> Result<Vec<Arc<dyn ChatProvider>>, AppError> {
    let providers = &config.providers;

    let primary = OpenAiCompatProvider::new(OpenAiCompatConfig {
        name: PRIMARY_PROVIDER_NAME.to_string(),
        api_key: providers.primary.api_key.clone(),
        base_url: providers.primary.base_url.clone(),
        model: providers.primary.model.clone(),
        timeout: providers.timeout(),
    })
    .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

    let secondary = GeminiProvider::new(GeminiConfig {
        api_key: providers.secondary.api_key.clone(),
        model: providers.secondary.model.clone(),
        base_url: providers.secondary.base_url.clone(),
        thinking: providers.secondary.thinking,
        search: providers.secondary.search,
        timeout: providers.timeout(),
    })
    .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

    tracing::info!(
        primary_model = %providers.primary.model,
        primary_configured = providers.primary.api_key.is_some(),
        secondary_model = %providers.secondary.model,
        secondary_configured = providers.secondary.api_key.is_some(),
        "Initialized chat providers"
    );

    Ok(vec![Arc::new(primary), Arc::new(secondary)])
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect storage, wire providers and bind the listener.
    pub async fn build(config: ChatRelayConfig) -> Result<Self, AppError> {
        let db = AnalyticsDb::connect(&config.database.url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to open analytics database: {}", e);
                e
            })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;

        if !config.providers.any_credential() {
            tracing::warn!(
                "No provider credentials configured; chat requests will fail until GROQ_API_KEY or GEMINI_API_KEY is set"
            );
        }

        let chat = ChatService::new(
            ConversationStore::new(),
            build_providers(&config)?,
            config.system_instruction.clone(),
            AnalyticsRecorder::new(db.clone()),
        );
        let limiter = create_cooldown_limiter(
            config.rate_limit.cooldown(),
            config.rate_limit.trust_forwarded_for,
        );
        let state = AppState::new(chat, db, limiter);

        // Port 0 binds a random port for testing.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            cooldown_ms = config.rate_limit.cooldown_ms,
            "Chat relay listening"
        );

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &AnalyticsDb {
        &self.state.db
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let db = self.state.db.clone();
        let router = build_router(self.state);

        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        db.close().await;
        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
