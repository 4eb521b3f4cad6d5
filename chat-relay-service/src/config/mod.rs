use service_core::config::{self as core_config, get_env, get_optional_env, get_parsed_env};
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Instruction used when no `SYSTEM_INSTRUCTION_FILE` is configured.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a professional system assistant. \
Answer clearly and calmly, explain actions step by step, and keep responses concise.";

#[derive(Debug, Clone)]
pub struct ChatRelayConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    /// OTLP collector endpoint; tracing export is disabled when unset.
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub rate_limit: RateLimitConfig,
    pub system_instruction: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub primary: PrimaryProviderConfig,
    pub secondary: SecondaryProviderConfig,
    pub timeout_secs: u64,
}

/// OpenAI-compatible chat completion backend (Groq by default).
#[derive(Debug, Clone)]
pub struct PrimaryProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Gemini streaming backend.
#[derive(Debug, Clone)]
pub struct SecondaryProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Unbounded thinking budget.
    pub thinking: bool,
    /// Google Search grounding tool.
    pub search: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub cooldown_ms: u64,
    /// Key clients on `X-Forwarded-For`. Only safe behind a proxy that sets it.
    pub trust_forwarded_for: bool,
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn any_credential(&self) -> bool {
        self.primary.api_key.is_some() || self.secondary.api_key.is_some()
    }
}

impl RateLimitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl ChatRelayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        let system_instruction = match get_optional_env("SYSTEM_INSTRUCTION_FILE") {
            Some(path) => std::fs::read_to_string(&path).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Failed to read system instruction from {}: {}",
                    path,
                    e
                ))
            })?,
            None => DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        };

        Ok(ChatRelayConfig {
            common: common_config,
            service_name: get_env("SERVICE_NAME", Some("chat-relay-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("sqlite://chatbot_analytics.db"),
                    is_prod,
                )?,
            },
            providers: ProvidersConfig {
                primary: PrimaryProviderConfig {
                    api_key: get_optional_env("GROQ_API_KEY"),
                    base_url: get_env(
                        "GROQ_BASE_URL",
                        Some("https://api.groq.com/openai/v1"),
                        is_prod,
                    )?,
                    model: get_env("GROQ_MODEL", Some("llama-3.3-70b-versatile"), is_prod)?,
                },
                secondary: SecondaryProviderConfig {
                    api_key: get_optional_env("GEMINI_API_KEY"),
                    base_url: get_env(
                        "GEMINI_BASE_URL",
                        Some("https://generativelanguage.googleapis.com/v1beta"),
                        is_prod,
                    )?,
                    model: get_env("GEMINI_MODEL", Some("gemini-flash-latest"), is_prod)?,
                    thinking: get_parsed_env("GEMINI_THINKING", true),
                    search: get_parsed_env("GEMINI_SEARCH", true),
                },
                timeout_secs: get_parsed_env("PROVIDER_TIMEOUT_SECS", 30),
            },
            rate_limit: RateLimitConfig {
                cooldown_ms: get_parsed_env("RATE_LIMIT_COOLDOWN_MS", 1000),
                trust_forwarded_for: get_parsed_env("TRUST_FORWARDED_FOR", false),
            },
            system_instruction,
        })
    }
}
