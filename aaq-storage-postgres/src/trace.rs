//! `TraceStore` implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::Row;
use uuid::Uuid;

use aaq_core::model::{ContentFeedback, QueryTrace, ResponseFeedback, RetrievedRef};
use aaq_core::storage::TraceStore;
use aaq_core::{Error, Result};

use crate::{db_err, PostgresStore};

impl PostgresStore {
    async fn fetch_trace(&self, query_id: Uuid, workspace_id: Option<i64>) -> Result<Option<QueryTrace>> {
        let row = sqlx::query(
            "SELECT id, workspace_id, query_text, query_metadata, generated_llm_response,
                    feedback_secret_key, query_embedding, pipeline_states, created_at
             FROM query_traces
             WHERE id = $1 AND ($2::bigint IS NULL OR workspace_id = $2)",
        )
        .bind(query_id)
        .bind(workspace_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get trace", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let refs = sqlx::query(
            "SELECT content_id, score FROM trace_content_refs
             WHERE query_id = $1 ORDER BY rank",
        )
        .bind(query_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("get trace refs", e))?;

        let retrieved = refs
            .iter()
            .map(|r| {
                Ok(RetrievedRef {
                    content_id: r.try_get("content_id").map_err(|e| db_err("ref.content_id", e))?,
                    score: r.try_get("score").map_err(|e| db_err("ref.score", e))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let embedding: Option<Vector> = row
            .try_get("query_embedding")
            .map_err(|e| db_err("trace.query_embedding", e))?;
        let pipeline_states: serde_json::Value = row
            .try_get("pipeline_states")
            .map_err(|e| db_err("trace.pipeline_states", e))?;

        Ok(Some(QueryTrace {
            id: row.try_get("id").map_err(|e| db_err("trace.id", e))?,
            workspace_id: row
                .try_get("workspace_id")
                .map_err(|e| db_err("trace.workspace_id", e))?,
            query_text: row
                .try_get("query_text")
                .map_err(|e| db_err("trace.query_text", e))?,
            query_metadata: row
                .try_get("query_metadata")
                .map_err(|e| db_err("trace.query_metadata", e))?,
            generated_llm_response: row
                .try_get("generated_llm_response")
                .map_err(|e| db_err("trace.generated_llm_response", e))?,
            retrieved,
            feedback_secret_key: row
                .try_get("feedback_secret_key")
                .map_err(|e| db_err("trace.feedback_secret_key", e))?,
            query_embedding: embedding.map(|v| v.to_vec()).unwrap_or_default(),
            pipeline_states: serde_json::from_value(pipeline_states)?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| db_err("trace.created_at", e))?,
        }))
    }
}

#[async_trait]
impl TraceStore for PostgresStore {
    async fn insert_trace(&self, trace: &QueryTrace) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin trace insert", e))?;

        let embedding = if trace.query_embedding.is_empty() {
            None
        } else {
            Some(Vector::from(trace.query_embedding.clone()))
        };

        sqlx::query(
            "INSERT INTO query_traces
                (id, workspace_id, query_text, query_metadata, generated_llm_response,
                 feedback_secret_key, query_embedding, pipeline_states, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(trace.id)
        .bind(trace.workspace_id)
        .bind(&trace.query_text)
        .bind(&trace.query_metadata)
        .bind(trace.generated_llm_response.as_deref())
        .bind(&trace.feedback_secret_key)
        .bind(embedding)
        .bind(serde_json::to_value(&trace.pipeline_states)?)
        .bind(trace.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_err("insert trace", e))?;

        for (rank, reference) in trace.retrieved.iter().enumerate() {
            sqlx::query(
                "INSERT INTO trace_content_refs (query_id, content_id, score, rank)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(trace.id)
            .bind(reference.content_id)
            .bind(reference.score)
            .bind(rank as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("insert trace ref", e))?;
        }

        tx.commit().await.map_err(|e| db_err("commit trace insert", e))
    }

    async fn attach_response(
        &self,
        query_id: Uuid,
        response: &str,
        pipeline_states: &[String],
    ) -> Result<()> {
        // One-shot: only a never-answered trace accepts a response
        let result = sqlx::query(
            "UPDATE query_traces
             SET generated_llm_response = $2, pipeline_states = $3
             WHERE id = $1 AND generated_llm_response IS NULL",
        )
        .bind(query_id)
        .bind(response)
        .bind(serde_json::to_value(pipeline_states)?)
        .execute(self.pool())
        .await
        .map_err(|e| db_err("attach response", e))?;

        if result.rows_affected() == 0 {
            tracing::debug!(%query_id, "response already attached or trace missing");
        }
        Ok(())
    }

    async fn get_trace(&self, workspace_id: i64, query_id: Uuid) -> Result<Option<QueryTrace>> {
        self.fetch_trace(query_id, Some(workspace_id)).await
    }

    async fn get_trace_any_workspace(&self, query_id: Uuid) -> Result<Option<QueryTrace>> {
        self.fetch_trace(query_id, None).await
    }

    async fn insert_response_feedback(&self, feedback: &ResponseFeedback) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO response_feedback (query_id, sentiment, feedback_text, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (query_id, sentiment) DO NOTHING",
        )
        .bind(feedback.query_id)
        .bind(feedback.sentiment.to_string())
        .bind(feedback.text.as_deref())
        .bind(feedback.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Error::TraceNotFound(feedback.query_id)
            }
            _ => db_err("insert response feedback", e),
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_content_feedback(&self, feedback: &ContentFeedback) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO content_feedback
                (query_id, content_id, sentiment, feedback_text, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (query_id, content_id, sentiment) DO NOTHING",
        )
        .bind(feedback.query_id)
        .bind(feedback.content_id)
        .bind(feedback.sentiment.to_string())
        .bind(feedback.text.as_deref())
        .bind(feedback.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Error::TraceNotFound(feedback.query_id)
            }
            _ => db_err("insert content feedback", e),
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn content_referenced_since(
        &self,
        workspace_id: i64,
        content_id: i64,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM trace_content_refs r
                JOIN query_traces t ON t.id = r.query_id
                WHERE t.workspace_id = $1 AND r.content_id = $2 AND t.created_at >= $3
            )",
        )
        .bind(workspace_id)
        .bind(content_id)
        .bind(since)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("content referenced", e))
    }
}
