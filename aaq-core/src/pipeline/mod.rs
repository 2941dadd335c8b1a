//! The search query pipeline.
//!
//! Drives one query through quota accounting, the guardrail state machine,
//! retrieval, optional grounded generation and the trace write:
//!
//! ```text
//! Auth & Quota → Guardrails (in) → Embedding → Retrieval
//!     → (optional) Generation → Guardrails (out) → Trace → Response
//! ```
//!
//! Quota consumption and the trace row are committed before the generation
//! call so accounting stays consistent when a client disconnects mid-flight.
//! Degraded paths (off-topic, generation failure, alignment failure) return
//! the best partial result with `warnings` instead of erroring.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::generate_secret_key;
use crate::cache::QuotaCounter;
use crate::error::{Error, Result};
use crate::generation::{fallback_answer, AnswerGenerator};
use crate::guardrails::{GuardrailChecks, PipelineState, RejectReason, StepOutcome};
use crate::model::{QueryTrace, RetrievedItem, RetrievedRef, Workspace};
use crate::retrieval::{RetrievalEngine, ScoredContent};
use crate::session::SessionManager;
use crate::storage::TraceStore;

/// One search request after HTTP validation
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query_text: String,
    pub generate_llm_response: bool,
    pub query_metadata: serde_json::Value,
    /// Continue an existing chat session
    pub session_id: Option<Uuid>,
}

/// Pipeline result delivered to the HTTP layer
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query_id: Uuid,
    pub feedback_secret_key: String,
    /// Ranked hits; empty when the query was blocked
    pub results: Vec<RetrievedItem>,
    pub llm_response: Option<String>,
    /// Set when a guardrail rejected the query; the HTTP status is still 200
    pub blocked_reason: Option<&'static str>,
    /// Non-fatal degradations the caller should know about
    pub warnings: Vec<String>,
    pub session_id: Option<Uuid>,
}

/// Query pipeline orchestrator
pub struct QueryService {
    retrieval: RetrievalEngine,
    checks: GuardrailChecks,
    generator: AnswerGenerator,
    traces: Arc<dyn TraceStore>,
    quota: Arc<dyn QuotaCounter>,
    sessions: SessionManager,
    top_k: usize,
}

impl QueryService {
    #[must_use]
    pub fn new(
        retrieval: RetrievalEngine,
        checks: GuardrailChecks,
        generator: AnswerGenerator,
        traces: Arc<dyn TraceStore>,
        quota: Arc<dyn QuotaCounter>,
        sessions: SessionManager,
        top_k: usize,
    ) -> Self {
        Self {
            retrieval,
            checks,
            generator,
            traces,
            quota,
            sessions,
            top_k,
        }
    }

    /// Run one query through the pipeline.
    ///
    /// Fails `QuotaExceeded` before any other side effect; afterwards every
    /// outcome (including guardrail rejections) produces a trace row.
    pub async fn handle_search(
        &self,
        workspace: &Workspace,
        request: SearchRequest,
    ) -> Result<SearchOutcome> {
        let query_text = request.query_text.trim();
        if query_text.is_empty() {
            return Err(Error::Validation("query_text must not be empty".to_string()));
        }

        self.quota
            .check_and_consume(
                workspace.id,
                Utc::now().date_naive(),
                workspace.api_daily_quota,
                1,
            )
            .await?;

        let mut states = vec![PipelineState::Received.as_str().to_string()];
        let mut warnings = Vec::new();
        let mut effective_query = query_text.to_string();

        // Input guardrails run only on the generation path
        if request.generate_llm_response {
            match self.checks.check_language(&effective_query).await {
                StepOutcome::Advance(_) => states.push(PipelineState::LangOk.as_str().to_string()),
                StepOutcome::Reject(reason) => {
                    return self
                        .blocked(workspace, &request, reason, states, warnings)
                        .await;
                }
                StepOutcome::Defer(warning) => warnings.push(warning),
            }

            match self.checks.check_safety(&effective_query).await {
                StepOutcome::Advance(query) => {
                    effective_query = query;
                    states.push(PipelineState::Safe.as_str().to_string());
                }
                StepOutcome::Reject(reason) => {
                    return self
                        .blocked(workspace, &request, reason, states, warnings)
                        .await;
                }
                StepOutcome::Defer(warning) => {
                    warnings.push(warning);
                    states.push(PipelineState::Safe.as_str().to_string());
                }
            }
        }

        let outcome = self
            .retrieval
            .search(workspace.id, &effective_query, self.top_k)
            .await?;

        // Relevance gate between retrieval candidates and generation
        let mut generate = request.generate_llm_response;
        if generate {
            match self
                .checks
                .check_on_topic(&outcome.query_embedding, &outcome.hits)
            {
                StepOutcome::Advance(_) => {
                    states.push(PipelineState::OnTopic.as_str().to_string());
                }
                StepOutcome::Defer(warning) => {
                    warnings.push(warning);
                    warnings.push("unable_to_answer".to_string());
                    generate = false;
                }
                StepOutcome::Reject(reason) => {
                    return self
                        .blocked(workspace, &request, reason, states, warnings)
                        .await;
                }
            }
        }
        states.push(PipelineState::Retrieved.as_str().to_string());

        if !generate {
            states.push(PipelineState::Delivered.as_str().to_string());
            let trace = self
                .write_trace(workspace, &request, &outcome.query_embedding, &outcome.hits, None, &states)
                .await?;
            return Ok(SearchOutcome {
                query_id: trace.id,
                feedback_secret_key: trace.feedback_secret_key,
                results: outcome.hits.iter().map(ScoredContent::to_item).collect(),
                llm_response: None,
                blocked_reason: None,
                warnings,
                session_id: request.session_id,
            });
        }

        // Accounting must survive cancellation of the generation call: the
        // trace row goes in first and the response is attached afterwards.
        let trace = self
            .write_trace(workspace, &request, &outcome.query_embedding, &outcome.hits, None, &states)
            .await?;

        let session = self
            .sessions
            .get_or_create(request.session_id, workspace.id, None)
            .await;
        let history = match &session {
            Ok(s) => s.history().iter().map(|(r, c)| (*r, (*c).to_string())).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "session unavailable, continuing without history");
                warnings.push("session_unavailable".to_string());
                Vec::new()
            }
        };
        let history_refs: Vec<(crate::model::TurnRole, &str)> =
            history.iter().map(|(r, c)| (*r, c.as_str())).collect();

        let mut llm_response = match self
            .generator
            .generate(&effective_query, &outcome.hits, &history_refs)
            .await
        {
            Ok(answer) => {
                states.push(PipelineState::Generated.as_str().to_string());
                Some(answer.llm_response)
            }
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, degrading to retrieval-only");
                warnings.push("generation_failed".to_string());
                None
            }
        };

        // Output guardrail: verify groundedness, fall back to titles-only
        if let Some(answer) = &llm_response {
            let snippets = outcome
                .hits
                .iter()
                .enumerate()
                .map(|(i, hit)| format!("[{}] {}: {}", i + 1, hit.content.title, hit.content.text))
                .collect::<Vec<_>>()
                .join("\n");
            match self.checks.check_alignment(answer, &snippets).await {
                StepOutcome::Advance(_) => {
                    states.push(PipelineState::Aligned.as_str().to_string());
                }
                StepOutcome::Defer(warning) => {
                    warnings.push(warning);
                    llm_response = Some(fallback_answer(&outcome.hits));
                }
                StepOutcome::Reject(_) => {
                    llm_response = Some(fallback_answer(&outcome.hits));
                }
            }
        }

        states.push(PipelineState::Delivered.as_str().to_string());
        if let Some(answer) = &llm_response {
            self.traces
                .attach_response(trace.id, answer, &states)
                .await?;
        }

        // Record the exchange after delivery is decided
        let session_id = match session {
            Ok(session) => {
                let assistant_text = llm_response.clone().unwrap_or_default();
                if !assistant_text.is_empty() {
                    if let Err(e) = self
                        .sessions
                        .append_exchange(session.session_id, query_text, &assistant_text)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to record session exchange");
                    }
                }
                Some(session.session_id)
            }
            Err(_) => None,
        };

        Ok(SearchOutcome {
            query_id: trace.id,
            feedback_secret_key: trace.feedback_secret_key,
            results: outcome.hits.iter().map(ScoredContent::to_item).collect(),
            llm_response,
            blocked_reason: None,
            warnings,
            session_id,
        })
    }

    /// Finish a rejected query: trace it and return the blocked response
    async fn blocked(
        &self,
        workspace: &Workspace,
        request: &SearchRequest,
        reason: RejectReason,
        mut states: Vec<String>,
        warnings: Vec<String>,
    ) -> Result<SearchOutcome> {
        states.push(PipelineState::Rejected.as_str().to_string());
        states.push(reason.as_str().to_string());

        let trace = self
            .write_trace(workspace, request, &[], &[], None, &states)
            .await?;

        Ok(SearchOutcome {
            query_id: trace.id,
            feedback_secret_key: trace.feedback_secret_key,
            results: Vec::new(),
            llm_response: None,
            blocked_reason: Some(reason.as_str()),
            warnings,
            session_id: request.session_id,
        })
    }

    async fn write_trace(
        &self,
        workspace: &Workspace,
        request: &SearchRequest,
        query_embedding: &[f32],
        hits: &[ScoredContent],
        llm_response: Option<String>,
        states: &[String],
    ) -> Result<QueryTrace> {
        let trace = QueryTrace {
            id: Uuid::new_v4(),
            workspace_id: workspace.id,
            query_text: request.query_text.clone(),
            query_metadata: request.query_metadata.clone(),
            generated_llm_response: llm_response,
            retrieved: hits
                .iter()
                .map(|hit| RetrievedRef {
                    content_id: hit.content.id,
                    score: hit.similarity,
                })
                .collect(),
            feedback_secret_key: generate_secret_key(),
            query_embedding: query_embedding.to_vec(),
            pipeline_states: states.to_vec(),
            created_at: Utc::now(),
        };
        self.traces.insert_trace(&trace).await?;
        Ok(trace)
    }
}
