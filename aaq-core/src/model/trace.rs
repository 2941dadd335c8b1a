//! Query traces and feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One retrieval hit as returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub id: i64,
    pub title: String,
    pub text: String,
    /// Cosine distance in `[0, 2]`; 0 = identical
    pub distance: f32,
}

/// Content reference with score as persisted on a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRef {
    pub content_id: i64,
    /// Cosine similarity at query time
    pub score: f32,
}

/// Immutable record of a processed query.
///
/// The row is written before any generation call so quota accounting and
/// feedback linkage survive client disconnects; the LLM response is attached
/// exactly once at delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTrace {
    pub id: Uuid,
    pub workspace_id: i64,
    pub query_text: String,
    pub query_metadata: serde_json::Value,
    pub generated_llm_response: Option<String>,
    /// Ordered by rank at query time
    pub retrieved: Vec<RetrievedRef>,
    /// Capability token for the feedback channel; never logged
    pub feedback_secret_key: String,
    /// Query embedding captured at query time; feeds topic clustering
    #[serde(skip_serializing)]
    pub query_embedding: Vec<f32>,
    /// Guardrail transitions in execution order, e.g. `["received", "lang_ok", ...]`
    pub pipeline_states: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Upvote or downvote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSentiment {
    Positive,
    Negative,
}

impl std::fmt::Display for FeedbackSentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackSentiment::Positive => write!(f, "positive"),
            FeedbackSentiment::Negative => write!(f, "negative"),
        }
    }
}

/// Feedback on the overall response to a query.
///
/// Keyed by `(query_id, sentiment)`: repeating a sentiment is a no-op,
/// the opposite sentiment is stored as a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFeedback {
    pub query_id: Uuid,
    pub sentiment: FeedbackSentiment,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Feedback on a specific retrieved content item; bumps the content's vote
/// counters on insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFeedback {
    pub query_id: Uuid,
    pub content_id: i64,
    pub sentiment: FeedbackSentiment,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}
