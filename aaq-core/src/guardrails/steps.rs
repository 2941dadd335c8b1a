//! Individual guardrail checks.
//!
//! LLM-backed checks (language, safety, alignment) run under the configured
//! step timeout and retry once on transport failure; the ON_TOPIC check is
//! pure vector math and never fails.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{RejectReason, SafetyAction, StepOutcome};
use crate::config::GuardrailSettings;
use crate::embeddings::cosine_similarity;
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, LlmService};
use crate::retrieval::ScoredContent;

#[derive(Debug, Deserialize)]
struct LanguageVerdict {
    /// ISO-639-1 code, lowercased by the prompt contract
    language: String,
}

#[derive(Debug, Deserialize)]
struct SafetyVerdict {
    safe: bool,
    #[serde(default)]
    category: Option<String>,
    /// Present when the classifier can offer a sanitized rewrite
    #[serde(default)]
    redacted_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlignmentVerdict {
    /// Groundedness score in [0, 1]
    score: f32,
}

/// LLM- and embedding-backed guardrail checks
pub struct GuardrailChecks {
    llm: Arc<LlmService>,
    settings: GuardrailSettings,
}

impl GuardrailChecks {
    #[must_use]
    pub fn new(llm: Arc<LlmService>, settings: GuardrailSettings) -> Self {
        Self { llm, settings }
    }

    /// LANG_OK: reject queries in languages the workspace does not support.
    ///
    /// A transport failure is non-blocking: the query proceeds with a
    /// recorded warning, since dropping real queries over a flaky classifier
    /// is worse than skipping the check.
    pub async fn check_language(&self, query: &str) -> StepOutcome<String> {
        let messages = vec![
            ChatMessage::system(
                "Identify the language of the user message. Respond with a JSON object \
                 {\"language\": \"<iso-639-1 code, lowercase>\"} and nothing else.",
            ),
            ChatMessage::user(query.to_string()),
        ];

        match self
            .classify::<LanguageVerdict, _, _>(|| self.llm.complete_json(messages.clone()))
            .await
        {
            Ok(verdict) => {
                let language = verdict.language.to_lowercase();
                if self.settings.allowed_languages.iter().any(|l| *l == language) {
                    StepOutcome::Advance(language)
                } else {
                    tracing::debug!(%language, "query language not supported");
                    StepOutcome::Reject(RejectReason::UnsupportedLanguage)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "language identification unavailable, continuing");
                StepOutcome::Defer("language_check_skipped".to_string())
            }
        }
    }

    /// SAFE: classify the query for abuse, self-harm and PII.
    ///
    /// The conservative fallback on classifier failure is to block: an
    /// unchecked unsafe query must never reach generation.
    pub async fn check_safety(&self, query: &str) -> StepOutcome<String> {
        let messages = vec![
            ChatMessage::system(
                "You are a content safety classifier for a health question-answering \
                 service. Flag messages containing abuse, intent to harm, self-harm, or \
                 personally identifiable information. Respond with a JSON object \
                 {\"safe\": bool, \"category\": string|null, \"redacted_text\": string|null} \
                 where redacted_text is the message with any PII removed, when removal \
                 makes the message safe.",
            ),
            ChatMessage::user(query.to_string()),
        ];

        let verdict = match self
            .classify::<SafetyVerdict, _, _>(|| self.llm.complete_json(messages.clone()))
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "safety classifier unavailable, blocking query");
                return StepOutcome::Reject(RejectReason::Unsafe);
            }
        };

        if verdict.safe {
            return StepOutcome::Advance(query.to_string());
        }

        tracing::debug!(category = ?verdict.category, "query flagged by safety classifier");
        match self.settings.safety_action {
            SafetyAction::Block => StepOutcome::Reject(RejectReason::Unsafe),
            SafetyAction::Redact => match verdict.redacted_text {
                Some(redacted) if !redacted.trim().is_empty() => StepOutcome::Advance(redacted),
                _ => StepOutcome::Reject(RejectReason::Unsafe),
            },
            SafetyAction::PassThrough => StepOutcome::Defer("unsafe_passed_through".to_string()),
        }
    }

    /// ON_TOPIC: require the best retrieved snippet to be similar enough to
    /// the query. Deterministic; below the paraphrase threshold the pipeline
    /// returns retrieval-only results marked unable to answer.
    #[must_use]
    pub fn check_on_topic(&self, query_embedding: &[f32], hits: &[ScoredContent]) -> StepOutcome<f32> {
        let best = hits
            .iter()
            .map(|hit| cosine_similarity(query_embedding, &hit.content.embedding))
            .fold(f32::MIN, f32::max);

        if hits.is_empty() || best < self.settings.paraphrase_threshold {
            StepOutcome::Defer("off_topic".to_string())
        } else {
            StepOutcome::Advance(best)
        }
    }

    /// ALIGNED: judge whether the generated answer is grounded in the
    /// snippets. Failure or a low score forces the templated fallback.
    pub async fn check_alignment(&self, answer: &str, snippets: &str) -> StepOutcome<f32> {
        let messages = vec![
            ChatMessage::system(
                "You judge whether an answer is fully grounded in the provided reference \
                 snippets. Score 1.0 when every claim is supported, 0.0 when none are. \
                 Respond with a JSON object {\"score\": number} and nothing else.",
            ),
            ChatMessage::user(format!("Snippets:\n{snippets}\n\nAnswer:\n{answer}")),
        ];

        match self
            .classify::<AlignmentVerdict, _, _>(|| self.llm.complete_json(messages.clone()))
            .await
        {
            Ok(verdict) if verdict.score >= self.settings.align_score_threshold => {
                StepOutcome::Advance(verdict.score)
            }
            Ok(verdict) => {
                tracing::debug!(score = verdict.score, "answer failed alignment check");
                StepOutcome::Defer("alignment_below_threshold".to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "alignment judge unavailable, forcing fallback");
                StepOutcome::Defer("alignment_check_failed".to_string())
            }
        }
    }

    /// Run a classifier with the step timeout, retrying once on transport
    /// failure or timeout
    async fn classify<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let step_timeout = Duration::from_secs(self.settings.step_timeout_secs);
        let mut last_err = None;

        for attempt in 0..2 {
            match tokio::time::timeout(step_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if !e.is_recoverable() {
                        return Err(e);
                    }
                    tracing::debug!(attempt, error = %e, "guardrail step failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    tracing::debug!(attempt, "guardrail step timed out");
                    last_err = Some(Error::Timeout("guardrail step".to_string()));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Internal("guardrail retry bookkeeping".to_string())))
    }
}
