//! Urgency rules and detection traces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant-curated phrase describing an urgent situation, matched against
/// incoming queries by embedding similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyRule {
    pub id: i64,
    pub workspace_id: i64,
    pub text: String,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// A rule that scored above the urgency threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: i64,
    pub text: String,
    pub similarity: f32,
}

/// Record of one urgency classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgencyQueryTrace {
    pub id: Uuid,
    pub workspace_id: i64,
    pub query_text: String,
    pub is_urgent: bool,
    /// Ordered by similarity descending
    pub matched_rules: Vec<MatchedRule>,
    /// Set when the LLM strategy returned malformed output
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
