//! Urgent-query detection.
//!
//! Two strategies, selected per workspace by configuration of its rules: a
//! workspace with urgency rules uses embedding similarity against them; a
//! workspace without rules falls back to a single LLM classification. Every
//! detection writes an [`UrgencyQueryTrace`].

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::embeddings::{cosine_similarity, EmbeddingService};
use crate::llm::{ChatMessage, LlmService};
use crate::model::{MatchedRule, UrgencyQueryTrace, UrgencyRule};
use crate::storage::UrgencyStore;
use crate::Result;

#[derive(Debug, Deserialize)]
struct LlmUrgencyVerdict {
    is_urgent: bool,
    #[serde(default)]
    #[allow(dead_code)]
    rationale: Option<String>,
}

/// Urgency detector over both strategies
pub struct UrgencyDetector {
    store: Arc<dyn UrgencyStore>,
    embeddings: Arc<EmbeddingService>,
    llm: Arc<LlmService>,
    /// Rule similarity threshold; matches at or above it flag the query
    threshold: f32,
}

impl UrgencyDetector {
    #[must_use]
    pub fn new(
        store: Arc<dyn UrgencyStore>,
        embeddings: Arc<EmbeddingService>,
        llm: Arc<LlmService>,
        threshold: f32,
    ) -> Self {
        Self {
            store,
            embeddings,
            llm,
            threshold,
        }
    }

    /// Create a rule, embedding its text for similarity matching
    pub async fn create_rule(&self, workspace_id: i64, text: &str) -> Result<UrgencyRule> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::Validation(
                "rule text must not be empty".to_string(),
            ));
        }
        let embedding = self.embeddings.embed(trimmed).await?;
        self.store.create_rule(workspace_id, trimmed, embedding).await
    }

    pub async fn list_rules(&self, workspace_id: i64) -> Result<Vec<UrgencyRule>> {
        self.store.list_rules(workspace_id).await
    }

    pub async fn delete_rule(&self, workspace_id: i64, rule_id: i64) -> Result<()> {
        if self.store.delete_rule(workspace_id, rule_id).await? {
            Ok(())
        } else {
            Err(crate::Error::NotFound(format!("urgency rule {rule_id}")))
        }
    }

    /// Classify a query and persist the detection trace
    pub async fn detect(&self, workspace_id: i64, query_text: &str) -> Result<UrgencyQueryTrace> {
        let rules = self.store.list_rules(workspace_id).await?;

        let (is_urgent, matched_rules, failure_reason) = if rules.is_empty() {
            let (urgent, failure) = self.detect_with_llm(query_text).await;
            (urgent, Vec::new(), failure)
        } else {
            let matches = self.match_rules(query_text, &rules).await?;
            (!matches.is_empty(), matches, None)
        };

        let trace = UrgencyQueryTrace {
            id: Uuid::new_v4(),
            workspace_id,
            query_text: query_text.to_string(),
            is_urgent,
            matched_rules,
            failure_reason,
            created_at: Utc::now(),
        };
        self.store.insert_urgency_trace(&trace).await?;
        Ok(trace)
    }

    /// Rule strategy: cosine similarity between the query and each rule,
    /// matches ordered by similarity descending
    async fn match_rules(
        &self,
        query_text: &str,
        rules: &[UrgencyRule],
    ) -> Result<Vec<MatchedRule>> {
        let query_embedding = self.embeddings.embed(query_text).await?;

        let mut matches: Vec<MatchedRule> = rules
            .iter()
            .filter_map(|rule| {
                let similarity = cosine_similarity(&query_embedding, &rule.embedding);
                (similarity >= self.threshold).then(|| MatchedRule {
                    rule_id: rule.id,
                    text: rule.text.clone(),
                    similarity,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        Ok(matches)
    }

    /// LLM strategy: one strict-JSON classification. Malformed output or an
    /// unavailable endpoint is treated as not urgent with the failure
    /// recorded, never as an error to the caller.
    async fn detect_with_llm(&self, query_text: &str) -> (bool, Option<String>) {
        let messages = vec![
            ChatMessage::system(
                "Decide whether the user message describes a medically urgent situation \
                 needing immediate attention. Respond with a JSON object \
                 {\"is_urgent\": bool, \"rationale\": string} and nothing else.",
            ),
            ChatMessage::user(query_text.to_string()),
        ];

        match self.llm.complete_json::<LlmUrgencyVerdict>(messages).await {
            Ok(verdict) => (verdict.is_urgent, None),
            Err(e) => {
                tracing::warn!(error = %e, "LLM urgency classification failed");
                (false, Some(e.to_string()))
            }
        }
    }
}
