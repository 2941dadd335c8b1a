//! # AAQ Core
//!
//! Core of the Ask-A-Question service: a multi-tenant question-answering
//! pipeline that retrieves answers from tenant-curated content by embedding
//! similarity and optionally generates a grounded LLM answer behind a
//! guardrail state machine.
//!
//! ## Module Organization
//!
//! ### Query path
//! - [`pipeline`]: the search orchestrator (quota → guardrails → retrieval →
//!   generation → trace)
//! - [`retrieval`]: top-K cosine retrieval with deterministic ordering
//! - [`guardrails`]: language/safety/relevance/alignment state machine
//! - [`generation`]: grounded answer generation with citation validation
//! - [`urgency`]: rule-based and LLM-based urgent-query detection
//!
//! ### Substrate
//! - [`embeddings`]: text → vector with caching, concurrency limits and a
//!   circuit breaker
//! - [`llm`]: chat-completions access shared by every LLM-backed step
//! - [`storage`] / [`cache`]: async trait seams to Postgres and Redis
//! - [`identity`]: users, workspaces, roles, JWTs, API keys
//! - [`content`]: content/tag CRUD, quotas and bulk import
//! - [`session`]: bounded multi-turn chat buffers
//! - [`feedback`]: capability-authorized feedback intake
//! - [`analytics`]: dashboard aggregates and topic clustering
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`] with the service-wide [`Error`]
//! taxonomy; guardrail rejections are response annotations, not errors.

pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod constants;
pub mod content;
pub mod embeddings;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod guardrails;
pub mod identity;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod urgency;

// Re-export commonly used types
pub use analytics::{DashboardService, PeriodBounds, StatsPeriod, TimeFrequency, TopicService};
pub use config::Settings;
pub use content::{ContentService, DeleteOutcome};
pub use embeddings::{EmbeddingProvider, EmbeddingService};
pub use error::{Error, Result};
pub use feedback::{FeedbackAuth, FeedbackService};
pub use generation::AnswerGenerator;
pub use guardrails::{GuardrailChecks, PipelineState, RejectReason, StepOutcome};
pub use identity::{IdentityService, LoginOutcome};
pub use llm::{ChatModel, LlmService};
pub use pipeline::{QueryService, SearchOutcome, SearchRequest};
pub use retrieval::{RetrievalEngine, RetrievalOutcome, ScoredContent};
pub use session::SessionManager;
pub use urgency::UrgencyDetector;
