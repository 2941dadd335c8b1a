//! `AnalyticsStore` implementation: SQL aggregates over traces and feedback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::Row;

use aaq_core::analytics::{PeriodTotals, TimeFrequency, TimeSeriesPoint, TopContentRow};
use aaq_core::storage::AnalyticsStore;
use aaq_core::Result;

use crate::{db_err, PostgresStore};

fn trunc_unit(frequency: TimeFrequency) -> &'static str {
    match frequency {
        TimeFrequency::Hour => "hour",
        TimeFrequency::Day => "day",
        TimeFrequency::Week => "week",
        TimeFrequency::Month => "month",
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStore {
    async fn period_totals(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodTotals> {
        let query_count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM query_traces
             WHERE workspace_id = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("count queries", e))?;

        let row = sqlx::query(
            "SELECT
                count(*) FILTER (WHERE f.sentiment = 'positive') AS upvotes,
                count(*) FILTER (WHERE f.sentiment = 'negative') AS downvotes
             FROM response_feedback f
             JOIN query_traces t ON t.id = f.query_id
             WHERE t.workspace_id = $1 AND f.created_at >= $2 AND f.created_at < $3",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("count feedback", e))?;

        let urgent_count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM urgency_query_traces
             WHERE workspace_id = $1 AND is_urgent AND created_at >= $2 AND created_at < $3",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("count urgent queries", e))?;

        Ok(PeriodTotals {
            query_count,
            upvotes: row.try_get("upvotes").map_err(|e| db_err("upvotes", e))?,
            downvotes: row
                .try_get("downvotes")
                .map_err(|e| db_err("downvotes", e))?,
            urgent_count,
        })
    }

    async fn query_timeseries(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        frequency: TimeFrequency,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let rows = sqlx::query(
            "SELECT date_trunc($4, created_at) AS bucket_start, count(*) AS query_count
             FROM query_traces
             WHERE workspace_id = $1 AND created_at >= $2 AND created_at < $3
             GROUP BY bucket_start
             ORDER BY bucket_start",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .bind(trunc_unit(frequency))
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("query timeseries", e))?;

        rows.iter()
            .map(|row| {
                Ok(TimeSeriesPoint {
                    bucket_start: row
                        .try_get("bucket_start")
                        .map_err(|e| db_err("bucket_start", e))?,
                    count: row
                        .try_get("query_count")
                        .map_err(|e| db_err("query_count", e))?,
                })
            })
            .collect()
    }

    async fn top_content(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TopContentRow>> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.is_archived, c.positive_votes, c.negative_votes,
                    count(*) AS query_count
             FROM trace_content_refs r
             JOIN query_traces t ON t.id = r.query_id
             JOIN contents c ON c.id = r.content_id
             WHERE t.workspace_id = $1 AND t.created_at >= $2 AND t.created_at < $3
             GROUP BY c.id
             ORDER BY query_count DESC, c.id ASC
             LIMIT $4",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("top content", e))?;

        rows.iter()
            .map(|row| {
                let title: String = row.try_get("title").map_err(|e| db_err("title", e))?;
                let is_archived: bool = row
                    .try_get("is_archived")
                    .map_err(|e| db_err("is_archived", e))?;
                Ok(TopContentRow {
                    content_id: row.try_get("id").map_err(|e| db_err("id", e))?,
                    title: if is_archived {
                        format!("[DELETED] {title}")
                    } else {
                        title
                    },
                    query_count: row
                        .try_get("query_count")
                        .map_err(|e| db_err("query_count", e))?,
                    positive_votes: row
                        .try_get("positive_votes")
                        .map_err(|e| db_err("positive_votes", e))?,
                    negative_votes: row
                        .try_get("negative_votes")
                        .map_err(|e| db_err("negative_votes", e))?,
                })
            })
            .collect()
    }

    async fn recent_query_embeddings(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<f32>)>> {
        let rows = sqlx::query(
            "SELECT query_text, query_embedding
             FROM query_traces
             WHERE workspace_id = $1 AND created_at >= $2 AND created_at < $3
               AND query_embedding IS NOT NULL
             ORDER BY created_at DESC
             LIMIT $4",
        )
        .bind(workspace_id)
        .bind(from)
        .bind(to)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("recent query embeddings", e))?;

        rows.iter()
            .map(|row| {
                let text: String = row
                    .try_get("query_text")
                    .map_err(|e| db_err("query_text", e))?;
                let embedding: Vector = row
                    .try_get("query_embedding")
                    .map_err(|e| db_err("query_embedding", e))?;
                Ok((text, embedding.to_vec()))
            })
            .collect()
    }

    async fn save_topic_insights(
        &self,
        workspace_id: i64,
        payload: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO topic_insights (workspace_id, payload, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (workspace_id)
             DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(workspace_id)
        .bind(payload)
        .execute(self.pool())
        .await
        .map_err(|e| db_err("save topic insights", e))?;
        Ok(())
    }

    async fn load_topic_insights(&self, workspace_id: i64) -> Result<Option<serde_json::Value>> {
        sqlx::query_scalar("SELECT payload FROM topic_insights WHERE workspace_id = $1")
            .bind(workspace_id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| db_err("load topic insights", e))
    }
}
