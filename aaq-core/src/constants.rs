//! Service-wide default values.
//!
//! Every default here can be overridden through the environment; see
//! [`crate::config::Settings`].

/// Default number of results returned by retrieval
pub const DEFAULT_TOP_K: usize = 4;

/// Content count below which retrieval scores every row in-process
pub const DEFAULT_EXACT_SEARCH_THRESHOLD: i64 = 512;

/// Default similarity floor (0.0 means no floor)
pub const DEFAULT_SIMILARITY_FLOOR: f32 = 0.0;

/// Self-retrieval distance bound used by the round-trip tests
pub const SELF_RETRIEVAL_EPSILON: f32 = 0.05;

/// Maximum content title length in characters
pub const MAX_TITLE_LEN: usize = 150;

/// Maximum content text length in characters
pub const MAX_TEXT_LEN: usize = 2000;

/// Maximum tag name length in characters
pub const MAX_TAG_LEN: usize = 50;

/// Maximum workspace name length in characters
pub const MAX_WORKSPACE_NAME_LEN: usize = 150;

/// Default embedding cache capacity (entries)
pub const DEFAULT_EMBEDDING_CACHE_SIZE: usize = 10_000;

/// Default concurrent in-flight embedding requests
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 32;

/// Default concurrent in-flight LLM requests
pub const DEFAULT_LLM_CONCURRENCY: usize = 16;

/// Default retry attempts against embedding/LLM endpoints
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base backoff delay between retries (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Default per-guardrail-step timeout (seconds)
pub const DEFAULT_GUARDRAIL_STEP_TIMEOUT_SECS: u64 = 10;

/// Default overall request deadline (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default JWT lifetime (hours)
pub const DEFAULT_JWT_TTL_HOURS: i64 = 24;

/// Default idle TTL for chat sessions (seconds)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Default maximum retained turns per chat session
pub const DEFAULT_SESSION_MAX_TURNS: usize = 10;

/// Default maximum characters per chat turn
pub const DEFAULT_SESSION_MAX_TURN_CHARS: usize = 4000;

/// Default cosine-similarity threshold for rule-based urgency detection
pub const DEFAULT_URGENCY_THRESHOLD: f32 = 0.75;

/// Default paraphrase/relevance threshold for the ON_TOPIC guardrail
pub const DEFAULT_PARAPHRASE_THRESHOLD: f32 = 0.25;

/// Default alignment-score threshold for the ALIGNED guardrail
pub const DEFAULT_ALIGN_SCORE_THRESHOLD: f32 = 0.7;

/// Default LLM sampling temperature (pinned low for reproducibility)
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.1;

/// Default LLM completion token bound
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 1024;

/// Length of generated API keys and feedback secret keys
pub const SECRET_KEY_LEN: usize = 32;

/// Number of plaintext key characters retained for display
pub const API_KEY_DISPLAY_PREFIX_LEN: usize = 5;

/// TTL applied to daily quota counter keys (seconds); covers clock skew
/// across the UTC day boundary
pub const QUOTA_KEY_TTL_SECS: u64 = 48 * 3600;

/// TTL for the per-session write lock (seconds)
pub const SESSION_LOCK_TTL_SECS: u64 = 5;
