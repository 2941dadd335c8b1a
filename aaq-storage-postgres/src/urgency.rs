//! `UrgencyStore` implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;

use aaq_core::model::{UrgencyQueryTrace, UrgencyRule};
use aaq_core::storage::UrgencyStore;
use aaq_core::Result;

use crate::{db_err, PostgresStore};

fn map_rule(row: &sqlx::postgres::PgRow) -> Result<UrgencyRule> {
    let embedding: Vector = row
        .try_get("embedding")
        .map_err(|e| db_err("rule.embedding", e))?;
    Ok(UrgencyRule {
        id: row.try_get("id").map_err(|e| db_err("rule.id", e))?,
        workspace_id: row
            .try_get("workspace_id")
            .map_err(|e| db_err("rule.workspace_id", e))?,
        text: row
            .try_get("rule_text")
            .map_err(|e| db_err("rule.rule_text", e))?,
        embedding: embedding.to_vec(),
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_err("rule.created_at", e))?,
    })
}

#[async_trait]
impl UrgencyStore for PostgresStore {
    async fn create_rule(
        &self,
        workspace_id: i64,
        text: &str,
        embedding: Vec<f32>,
    ) -> Result<UrgencyRule> {
        let row = sqlx::query(
            "INSERT INTO urgency_rules (workspace_id, rule_text, embedding)
             VALUES ($1, $2, $3)
             RETURNING id, workspace_id, rule_text, embedding, created_at",
        )
        .bind(workspace_id)
        .bind(text)
        .bind(Vector::from(embedding))
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("create urgency rule", e))?;
        map_rule(&row)
    }

    async fn list_rules(&self, workspace_id: i64) -> Result<Vec<UrgencyRule>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, rule_text, embedding, created_at
             FROM urgency_rules WHERE workspace_id = $1 ORDER BY id",
        )
        .bind(workspace_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("list urgency rules", e))?;
        rows.iter().map(map_rule).collect()
    }

    async fn delete_rule(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM urgency_rules WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| db_err("delete urgency rule", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_urgency_trace(&self, trace: &UrgencyQueryTrace) -> Result<()> {
        sqlx::query(
            "INSERT INTO urgency_query_traces
                (id, workspace_id, query_text, is_urgent, matched_rules, failure_reason, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(trace.id)
        .bind(trace.workspace_id)
        .bind(&trace.query_text)
        .bind(trace.is_urgent)
        .bind(serde_json::to_value(&trace.matched_rules)?)
        .bind(trace.failure_reason.as_deref())
        .bind(trace.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| db_err("insert urgency trace", e))?;
        Ok(())
    }
}
