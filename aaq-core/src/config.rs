//! Environment-driven service configuration.
//!
//! All tunables are read once at startup into a typed [`Settings`] struct;
//! components receive their sub-config by value. Missing required variables
//! fail fast with a descriptive error.

use crate::constants::*;
use crate::error::{Error, Result};
use crate::guardrails::SafetyAction;

/// Relational and cache connection settings
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Postgres DSN
    pub database_url: String,
    /// Redis connection URL
    pub redis_url: String,
    /// Connection pool size
    pub pool_size: u32,
}

/// JWT signing configuration
#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// Active signing secret
    pub secret: String,
    /// Previous secrets still accepted for validation (rotation grace list)
    pub previous_secrets: Vec<String>,
    /// Token lifetime in hours
    pub ttl_hours: i64,
}

/// Embedding endpoint configuration
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// OpenAI-compatible embeddings endpoint base URL
    pub endpoint: String,
    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,
    /// Model identifier sent with every request and mixed into cache keys
    pub model: String,
    /// Expected vector dimension; a mismatch at startup prevents writes
    pub dimension: usize,
    /// LRU cache capacity
    pub cache_size: usize,
    /// Global concurrent request limit
    pub max_concurrency: usize,
    /// Retry attempts on transport and 5xx errors
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// LLM endpoint configuration shared by guardrails, generation, urgency
/// detection and topic labelling
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// OpenAI-compatible chat-completions endpoint base URL
    pub endpoint: String,
    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature, pinned low for reproducibility
    pub temperature: f32,
    /// Completion token bound
    pub max_tokens: u32,
    /// Global concurrent request limit
    pub max_concurrency: usize,
    /// Retry attempts on transport and 5xx errors
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Retrieval behaviour
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Number of results returned per query
    pub top_k: usize,
    /// Results below this cosine similarity are dropped (0.0 = no floor)
    pub similarity_floor: f32,
    /// Workspaces with at most this many rows are scored exactly in-process
    pub exact_search_threshold: i64,
}

/// Guardrail pipeline thresholds and timeouts
#[derive(Debug, Clone)]
pub struct GuardrailSettings {
    /// ISO-639-1 codes of languages the service accepts
    pub allowed_languages: Vec<String>,
    /// ON_TOPIC threshold: max query/snippet similarity must reach this
    pub paraphrase_threshold: f32,
    /// ALIGNED threshold: judge score must reach this
    pub align_score_threshold: f32,
    /// What the SAFE guardrail does with flagged queries
    pub safety_action: SafetyAction,
    /// Per-step timeout in seconds
    pub step_timeout_secs: u64,
}

/// Chat session buffer limits
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Idle TTL in seconds; slides on every access
    pub ttl_secs: u64,
    /// Retained turns per session
    pub max_turns: usize,
    /// Character cap per turn
    pub max_turn_chars: usize,
}

/// Workspace defaults applied at creation time
#[derive(Debug, Clone)]
pub struct QuotaSettings {
    /// Default daily accepted-query ceiling (None = unlimited)
    pub default_api_daily_quota: Option<i64>,
    /// Default non-archived content ceiling (None = unlimited)
    pub default_content_quota: Option<i64>,
}

/// HTTP server binding and deadlines
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Overall request deadline in seconds; expiry surfaces 504
    pub request_timeout_secs: u64,
}

/// Urgency detection configuration
#[derive(Debug, Clone)]
pub struct UrgencySettings {
    /// Rule-based similarity threshold
    pub similarity_threshold: f32,
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub jwt: JwtSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub guardrails: GuardrailSettings,
    pub session: SessionSettings,
    pub quota: QuotaSettings,
    pub urgency: UrgencySettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// `DATABASE_URL`, `REDIS_URL` and `JWT_SECRET` are required; everything
    /// else falls back to the documented defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            store: StoreSettings {
                database_url: require("DATABASE_URL")?,
                redis_url: require("REDIS_URL")?,
                pool_size: parse_or("DB_POOL_SIZE", 20)?,
            },
            jwt: JwtSettings {
                secret: require("JWT_SECRET")?,
                previous_secrets: list_var("JWT_PREVIOUS_SECRETS"),
                ttl_hours: parse_or("JWT_TTL_HOURS", DEFAULT_JWT_TTL_HOURS)?,
            },
            embedding: EmbeddingSettings {
                endpoint: var_or("EMBEDDING_ENDPOINT", "http://localhost:4000/v1"),
                api_key: optional("EMBEDDING_API_KEY"),
                model: var_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                dimension: parse_or("EMBEDDING_DIM", 1536)?,
                cache_size: parse_or("EMBEDDING_CACHE_SIZE", DEFAULT_EMBEDDING_CACHE_SIZE)?,
                max_concurrency: parse_or("EMBEDDING_MAX_CONCURRENCY", DEFAULT_EMBEDDING_CONCURRENCY)?,
                max_retries: parse_or("EMBEDDING_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                retry_delay_ms: parse_or("EMBEDDING_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
                timeout_secs: parse_or("EMBEDDING_TIMEOUT_SECONDS", DEFAULT_GUARDRAIL_STEP_TIMEOUT_SECS)?,
            },
            llm: LlmSettings {
                endpoint: var_or("LLM_ENDPOINT", "http://localhost:4000/v1"),
                api_key: optional("LLM_API_KEY"),
                model: var_or("LLM_MODEL", "gpt-4o-mini"),
                temperature: parse_or("LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?,
                max_tokens: parse_or("LLM_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS)?,
                max_concurrency: parse_or("LLM_MAX_CONCURRENCY", DEFAULT_LLM_CONCURRENCY)?,
                max_retries: parse_or("LLM_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
                retry_delay_ms: parse_or("LLM_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)?,
                timeout_secs: parse_or("LLM_TIMEOUT_SECONDS", DEFAULT_GUARDRAIL_STEP_TIMEOUT_SECS)?,
            },
            retrieval: RetrievalSettings {
                top_k: parse_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
                similarity_floor: parse_or("RETRIEVAL_SIMILARITY_FLOOR", DEFAULT_SIMILARITY_FLOOR)?,
                exact_search_threshold: parse_or(
                    "RETRIEVAL_EXACT_THRESHOLD",
                    DEFAULT_EXACT_SEARCH_THRESHOLD,
                )?,
            },
            guardrails: GuardrailSettings {
                allowed_languages: {
                    let langs = list_var("ALLOWED_LANGUAGES");
                    if langs.is_empty() {
                        vec!["en".to_string()]
                    } else {
                        langs
                    }
                },
                paraphrase_threshold: parse_or("PARAPHRASE_THRESHOLD", DEFAULT_PARAPHRASE_THRESHOLD)?,
                align_score_threshold: parse_or(
                    "ALIGN_SCORE_THRESHOLD",
                    DEFAULT_ALIGN_SCORE_THRESHOLD,
                )?,
                safety_action: parse_or("SAFETY_ACTION", SafetyAction::Block)?,
                step_timeout_secs: parse_or(
                    "GUARDRAIL_STEP_TIMEOUT_SECONDS",
                    DEFAULT_GUARDRAIL_STEP_TIMEOUT_SECS,
                )?,
            },
            session: SessionSettings {
                ttl_secs: parse_or("SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECS)?,
                max_turns: parse_or("SESSION_MAX_TURNS", DEFAULT_SESSION_MAX_TURNS)?,
                max_turn_chars: parse_or("SESSION_MAX_TURN_CHARS", DEFAULT_SESSION_MAX_TURN_CHARS)?,
            },
            quota: QuotaSettings {
                default_api_daily_quota: optional_parse("DEFAULT_API_DAILY_QUOTA")?,
                default_content_quota: optional_parse("DEFAULT_CONTENT_QUOTA")?,
            },
            urgency: UrgencySettings {
                similarity_threshold: parse_or(
                    "URGENCY_SIMILARITY_THRESHOLD",
                    DEFAULT_URGENCY_THRESHOLD,
                )?,
            },
            server: ServerSettings {
                host: var_or("SERVER_HOST", "0.0.0.0"),
                port: parse_or("SERVER_PORT", 8000)?,
                request_timeout_secs: parse_or(
                    "REQUEST_TIMEOUT_SECONDS",
                    DEFAULT_REQUEST_TIMEOUT_SECS,
                )?,
            },
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Validation(format!("required environment variable {name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn list_var(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("environment variable {name} is not valid: {raw}"))),
        Err(_) => Ok(default),
    }
}

fn optional_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Validation(format!("environment variable {name} is not valid: {raw}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_var_splits_and_trims() {
        std::env::set_var("AAQ_TEST_LANGS", "en, sw ,fr,");
        let langs = list_var("AAQ_TEST_LANGS");
        assert_eq!(langs, vec!["en", "sw", "fr"]);
        std::env::remove_var("AAQ_TEST_LANGS");
    }

    #[test]
    fn parse_or_rejects_garbage() {
        std::env::set_var("AAQ_TEST_NUM", "not-a-number");
        let result: Result<usize> = parse_or("AAQ_TEST_NUM", 5);
        assert!(result.is_err());
        std::env::remove_var("AAQ_TEST_NUM");
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: usize = parse_or("AAQ_TEST_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }
}
