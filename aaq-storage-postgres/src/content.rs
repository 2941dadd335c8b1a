//! `ContentStore` implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;

use aaq_core::model::{Content, ContentUpdate, FeedbackSentiment, NewContent, Tag};
use aaq_core::storage::{ContentFilter, ContentStore};
use aaq_core::{Error, Result};

use crate::{db_err, map_content, PostgresStore};

const CONTENT_COLUMNS: &str = "id, workspace_id, title, content_text, metadata, tag_ids, \
     is_archived, positive_votes, negative_votes, embedding, created_at, updated_at";

fn map_tag(row: &sqlx::postgres::PgRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id").map_err(|e| db_err("tag.id", e))?,
        workspace_id: row
            .try_get("workspace_id")
            .map_err(|e| db_err("tag.workspace_id", e))?,
        name: row.try_get("name").map_err(|e| db_err("tag.name", e))?,
    })
}

#[async_trait]
impl ContentStore for PostgresStore {
    async fn create_content(
        &self,
        workspace_id: i64,
        content: &NewContent,
        embedding: Vec<f32>,
    ) -> Result<Content> {
        let row = sqlx::query(&format!(
            "INSERT INTO contents
                (workspace_id, title, content_text, metadata, tag_ids, embedding)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(workspace_id)
        .bind(&content.title)
        .bind(&content.text)
        .bind(&content.metadata)
        .bind(&content.tag_ids)
        .bind(Vector::from(embedding))
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err(&format!("content title {}", content.title), e))?;
        map_content(&row)
    }

    async fn get_content(&self, workspace_id: i64, id: i64) -> Result<Option<Content>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE workspace_id = $1 AND id = $2"
        ))
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("get content", e))?;
        row.as_ref().map(map_content).transpose()
    }

    async fn update_content(
        &self,
        workspace_id: i64,
        id: i64,
        update: &ContentUpdate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content> {
        let row = sqlx::query(&format!(
            "UPDATE contents SET
                title = COALESCE($3, title),
                content_text = COALESCE($4, content_text),
                metadata = COALESCE($5, metadata),
                tag_ids = COALESCE($6, tag_ids),
                embedding = COALESCE($7, embedding),
                updated_at = now()
             WHERE workspace_id = $1 AND id = $2
             RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(workspace_id)
        .bind(id)
        .bind(update.title.as_deref())
        .bind(update.text.as_deref())
        .bind(update.metadata.as_ref())
        .bind(update.tag_ids.as_deref())
        .bind(embedding.map(Vector::from))
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("update content", e))?
        .ok_or_else(|| Error::NotFound(format!("content {id}")))?;
        map_content(&row)
    }

    async fn set_archived(&self, workspace_id: i64, id: i64, archived: bool) -> Result<Content> {
        let row = sqlx::query(&format!(
            "UPDATE contents SET is_archived = $3, updated_at = now()
             WHERE workspace_id = $1 AND id = $2
             RETURNING {CONTENT_COLUMNS}"
        ))
        .bind(workspace_id)
        .bind(id)
        .bind(archived)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_err("set archived", e))?
        .ok_or_else(|| Error::NotFound(format!("content {id}")))?;
        map_content(&row)
    }

    async fn delete_content(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM contents WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| db_err("delete content", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_content(
        &self,
        workspace_id: i64,
        filter: &ContentFilter,
    ) -> Result<Vec<Content>> {
        let limit = if filter.limit <= 0 { i64::MAX } else { filter.limit };
        let search = filter
            .search_text
            .as_ref()
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents
             WHERE workspace_id = $1
               AND ($2 OR NOT is_archived)
               AND (cardinality($3::bigint[]) = 0 OR tag_ids @> $3)
               AND ($4::text IS NULL OR title ILIKE $4 OR content_text ILIKE $4)
             ORDER BY id
             OFFSET $5 LIMIT $6"
        ))
        .bind(workspace_id)
        .bind(filter.include_archived)
        .bind(&filter.tag_ids)
        .bind(search)
        .bind(filter.skip.max(0))
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("list content", e))?;
        rows.iter().map(map_content).collect()
    }

    async fn count_content(&self, workspace_id: i64, include_archived: bool) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT count(*) FROM contents
             WHERE workspace_id = $1 AND ($2 OR NOT is_archived)",
        )
        .bind(workspace_id)
        .bind(include_archived)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("count content", e))
    }

    async fn list_active_embeddings(&self, workspace_id: i64) -> Result<Vec<(i64, Vec<f32>)>> {
        let rows = sqlx::query(
            "SELECT id, embedding FROM contents
             WHERE workspace_id = $1 AND NOT is_archived",
        )
        .bind(workspace_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("list embeddings", e))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id").map_err(|e| db_err("content.id", e))?;
                let embedding: Vector = row
                    .try_get("embedding")
                    .map_err(|e| db_err("content.embedding", e))?;
                Ok((id, embedding.to_vec()))
            })
            .collect()
    }

    async fn approx_search(
        &self,
        workspace_id: i64,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f32)>> {
        let rows = sqlx::query(
            "SELECT id, 1 - (embedding <=> $2) AS similarity
             FROM contents
             WHERE workspace_id = $1 AND NOT is_archived
             ORDER BY embedding <=> $2 ASC, id ASC
             LIMIT $3",
        )
        .bind(workspace_id)
        .bind(Vector::from(query.to_vec()))
        .bind(k as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("vector search", e))?;

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id").map_err(|e| db_err("content.id", e))?;
                let similarity: f64 = row
                    .try_get("similarity")
                    .map_err(|e| db_err("content.similarity", e))?;
                Ok((id, similarity as f32))
            })
            .collect()
    }

    async fn get_contents_by_ids(&self, workspace_id: i64, ids: &[i64]) -> Result<Vec<Content>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents
             WHERE workspace_id = $1 AND id = ANY($2)"
        ))
        .bind(workspace_id)
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("get contents by ids", e))?;

        let mut by_id = std::collections::HashMap::new();
        for row in &rows {
            let content = map_content(row)?;
            by_id.insert(content.id, content);
        }
        // Preserve the caller's ranking order
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn existing_titles(&self, workspace_id: i64, titles: &[String]) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT title FROM contents
             WHERE workspace_id = $1 AND NOT is_archived AND title = ANY($2)",
        )
        .bind(workspace_id)
        .bind(titles)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("existing titles", e))
    }

    async fn existing_texts(&self, workspace_id: i64, texts: &[String]) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT content_text FROM contents
             WHERE workspace_id = $1 AND NOT is_archived AND content_text = ANY($2)",
        )
        .bind(workspace_id)
        .bind(texts)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("existing texts", e))
    }

    async fn record_vote(
        &self,
        workspace_id: i64,
        content_id: i64,
        sentiment: FeedbackSentiment,
    ) -> Result<()> {
        let column = match sentiment {
            FeedbackSentiment::Positive => "positive_votes",
            FeedbackSentiment::Negative => "negative_votes",
        };
        let result = sqlx::query(&format!(
            "UPDATE contents SET {column} = {column} + 1
             WHERE workspace_id = $1 AND id = $2"
        ))
        .bind(workspace_id)
        .bind(content_id)
        .execute(self.pool())
        .await
        .map_err(|e| db_err("record vote", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("content {content_id}")));
        }
        Ok(())
    }

    async fn create_tag(&self, workspace_id: i64, name: &str) -> Result<Tag> {
        let row = sqlx::query(
            "INSERT INTO tags (workspace_id, name) VALUES ($1, $2)
             RETURNING id, workspace_id, name",
        )
        .bind(workspace_id)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err(&format!("tag {name}"), e))?;
        map_tag(&row)
    }

    async fn list_tags(&self, workspace_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT id, workspace_id, name FROM tags WHERE workspace_id = $1 ORDER BY id",
        )
        .bind(workspace_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_err("list tags", e))?;
        rows.iter().map(map_tag).collect()
    }

    async fn delete_tag(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| db_err("begin tag delete", e))?;

        let result = sqlx::query("DELETE FROM tags WHERE workspace_id = $1 AND id = $2")
            .bind(workspace_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("delete tag", e))?;

        if result.rows_affected() > 0 {
            sqlx::query(
                "UPDATE contents SET tag_ids = array_remove(tag_ids, $2)
                 WHERE workspace_id = $1 AND tag_ids @> ARRAY[$2]::bigint[]",
            )
            .bind(workspace_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("detach tag", e))?;
        }

        tx.commit().await.map_err(|e| db_err("commit tag delete", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn tags_exist(&self, workspace_id: i64, ids: &[i64]) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM tags WHERE workspace_id = $1 AND id = ANY($2)",
        )
        .bind(workspace_id)
        .bind(ids)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_err("tags exist", e))?;
        Ok(found == ids.len() as i64)
    }
}
