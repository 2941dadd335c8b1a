//! Feedback intake with capability-style authorization.
//!
//! Feedback is accepted when the caller proves knowledge of the trace's
//! `feedback_secret_key`, or arrives through a workspace-authenticated
//! channel. Duplicate same-sentiment feedback is an idempotent no-op.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{ContentFeedback, FeedbackSentiment, QueryTrace, ResponseFeedback};
use crate::storage::{ContentStore, TraceStore};

/// How the feedback caller authenticated
#[derive(Debug, Clone)]
pub enum FeedbackAuth {
    /// Caller presented the per-trace secret
    SecretKey(String),
    /// Caller holds the workspace API key (or a session bound to it)
    Workspace(i64),
}

/// Feedback intake service
pub struct FeedbackService {
    traces: Arc<dyn TraceStore>,
    contents: Arc<dyn ContentStore>,
}

impl FeedbackService {
    #[must_use]
    pub fn new(traces: Arc<dyn TraceStore>, contents: Arc<dyn ContentStore>) -> Self {
        Self { traces, contents }
    }

    /// Record feedback on the overall response.
    ///
    /// Returns `true` when a new row was stored, `false` on the idempotent
    /// duplicate path.
    pub async fn record_response_feedback(
        &self,
        query_id: Uuid,
        auth: &FeedbackAuth,
        sentiment: FeedbackSentiment,
        text: Option<String>,
    ) -> Result<bool> {
        let _trace = self.authorize(query_id, auth).await?;

        let stored = self
            .traces
            .insert_response_feedback(&ResponseFeedback {
                query_id,
                sentiment,
                text,
                created_at: Utc::now(),
            })
            .await?;

        if !stored {
            tracing::debug!(%query_id, %sentiment, "duplicate response feedback ignored");
        }
        Ok(stored)
    }

    /// Record feedback on one retrieved content item and bump its vote
    /// counters on first insert
    pub async fn record_content_feedback(
        &self,
        query_id: Uuid,
        content_id: i64,
        auth: &FeedbackAuth,
        sentiment: FeedbackSentiment,
        text: Option<String>,
    ) -> Result<bool> {
        let trace = self.authorize(query_id, auth).await?;

        if !trace.retrieved.iter().any(|r| r.content_id == content_id) {
            return Err(Error::Validation(format!(
                "content {content_id} was not part of query {query_id}"
            )));
        }

        let stored = self
            .traces
            .insert_content_feedback(&ContentFeedback {
                query_id,
                content_id,
                sentiment,
                text,
                created_at: Utc::now(),
            })
            .await?;

        if stored {
            self.contents
                .record_vote(trace.workspace_id, content_id, sentiment)
                .await?;
        }
        Ok(stored)
    }

    /// Resolve the trace and verify the caller may attach feedback to it
    async fn authorize(&self, query_id: Uuid, auth: &FeedbackAuth) -> Result<QueryTrace> {
        match auth {
            FeedbackAuth::SecretKey(key) => {
                let trace = self
                    .traces
                    .get_trace_any_workspace(query_id)
                    .await?
                    .ok_or(Error::TraceNotFound(query_id))?;
                if trace.feedback_secret_key != *key {
                    return Err(Error::Forbidden(
                        "feedback secret key does not match".to_string(),
                    ));
                }
                Ok(trace)
            }
            FeedbackAuth::Workspace(workspace_id) => self
                .traces
                .get_trace(*workspace_id, query_id)
                .await?
                .ok_or(Error::TraceNotFound(query_id)),
        }
    }
}
