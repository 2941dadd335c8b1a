//! Content and tag management workflows.
//!
//! Validates payloads, enforces content quotas, resolves tags and keeps
//! embeddings in lockstep with the text they index.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::embeddings::EmbeddingService;
use crate::error::{Error, Result};
use crate::model::{
    content::{parse_content_csv, validate_tag_name},
    Content, ContentUpdate, ImportError, ImportReport, NewContent, Tag, Workspace,
};
use crate::storage::{ContentFilter, ContentStore, TraceStore};

/// How long deleted content must stay reachable for trace integrity
const TRACE_RETENTION_DAYS: i64 = 90;

/// Content workflows over the store and embedding service
pub struct ContentService {
    store: Arc<dyn ContentStore>,
    traces: Arc<dyn TraceStore>,
    embeddings: Arc<EmbeddingService>,
}

impl ContentService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ContentStore>,
        traces: Arc<dyn TraceStore>,
        embeddings: Arc<EmbeddingService>,
    ) -> Self {
        Self {
            store,
            traces,
            embeddings,
        }
    }

    /// Create a content item: validate, enforce the workspace content
    /// quota, embed and write
    pub async fn create(&self, workspace: &Workspace, payload: NewContent) -> Result<Content> {
        payload.validate()?;
        self.ensure_tags(workspace.id, &payload.tag_ids).await?;
        self.ensure_content_quota(workspace, 1).await?;

        let embedding = self
            .embeddings
            .embed(&Content::embedding_input(&payload.title, &payload.text))
            .await?;
        self.store
            .create_content(workspace.id, &payload, embedding)
            .await
    }

    /// Apply a partial update, re-embedding only when title or text changed
    pub async fn update(
        &self,
        workspace: &Workspace,
        content_id: i64,
        update: ContentUpdate,
    ) -> Result<Content> {
        update.validate()?;
        if let Some(tag_ids) = &update.tag_ids {
            self.ensure_tags(workspace.id, tag_ids).await?;
        }

        let current = self
            .store
            .get_content(workspace.id, content_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("content {content_id}")))?;

        let embedding = if update.changes_embedded_text(&current) {
            let title = update.title.as_deref().unwrap_or(&current.title);
            let text = update.text.as_deref().unwrap_or(&current.text);
            Some(
                self.embeddings
                    .embed(&Content::embedding_input(title, text))
                    .await?,
            )
        } else {
            None
        };

        self.store
            .update_content(workspace.id, content_id, &update, embedding)
            .await
    }

    /// Archive: drop out of retrieval, keep for trace integrity
    pub async fn archive(&self, workspace_id: i64, content_id: i64) -> Result<Content> {
        self.store.set_archived(workspace_id, content_id, true).await
    }

    /// Unarchive: restore searchability. The stored embedding is reused, so
    /// no recomputation happens unless the text changed while archived.
    pub async fn unarchive(&self, workspace: &Workspace, content_id: i64) -> Result<Content> {
        self.ensure_content_quota(workspace, 1).await?;
        self.store
            .set_archived(workspace.id, content_id, false)
            .await
    }

    /// Hard-delete when no trace inside the retention window references the
    /// content; otherwise fall back to archiving
    pub async fn delete(&self, workspace_id: i64, content_id: i64) -> Result<DeleteOutcome> {
        let since = Utc::now() - Duration::days(TRACE_RETENTION_DAYS);
        if self
            .traces
            .content_referenced_since(workspace_id, content_id, since)
            .await?
        {
            tracing::debug!(content_id, "content referenced by traces, archiving instead");
            self.store.set_archived(workspace_id, content_id, true).await?;
            return Ok(DeleteOutcome::Archived);
        }

        if self.store.delete_content(workspace_id, content_id).await? {
            Ok(DeleteOutcome::Deleted)
        } else {
            Err(Error::NotFound(format!("content {content_id}")))
        }
    }

    pub async fn get(&self, workspace_id: i64, content_id: i64) -> Result<Content> {
        self.store
            .get_content(workspace_id, content_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("content {content_id}")))
    }

    pub async fn list(&self, workspace_id: i64, filter: &ContentFilter) -> Result<Vec<Content>> {
        self.store.list_content(workspace_id, filter).await
    }

    /// Bulk CSV import. Rows are validated independently; valid rows are
    /// embedded and written, invalid ones are reported per row.
    pub async fn bulk_import(&self, workspace: &Workspace, csv_bytes: &[u8]) -> Result<ImportReport> {
        let (rows, mut errors) = parse_content_csv(csv_bytes);

        // Duplicates against existing live content, checked per upload
        let titles: Vec<String> = rows.iter().map(|(_, r)| r.title.clone()).collect();
        let texts: Vec<String> = rows.iter().map(|(_, r)| r.text.clone()).collect();
        let existing_titles: HashSet<String> = self
            .store
            .existing_titles(workspace.id, &titles)
            .await?
            .into_iter()
            .collect();
        let existing_texts: HashSet<String> = self
            .store
            .existing_texts(workspace.id, &texts)
            .await?
            .into_iter()
            .collect();

        let mut importable = Vec::new();
        for (row_number, row) in rows {
            if existing_titles.contains(&row.title) {
                errors.push(ImportError::new(
                    "title_exists",
                    row_number,
                    format!("title '{}' already exists in this workspace", row.title),
                ));
            } else if existing_texts.contains(&row.text) {
                errors.push(ImportError::new(
                    "text_exists",
                    row_number,
                    "identical text already exists in this workspace".to_string(),
                ));
            } else {
                importable.push(row);
            }
        }

        self.ensure_content_quota(workspace, importable.len() as i64)
            .await?;

        let mut imported = 0;
        for row in importable {
            let embedding = self
                .embeddings
                .embed(&Content::embedding_input(&row.title, &row.text))
                .await?;
            self.store
                .create_content(workspace.id, &row, embedding)
                .await?;
            imported += 1;
        }

        errors.sort_by_key(|e| e.row);
        tracing::info!(
            workspace_id = workspace.id,
            imported,
            rejected = errors.len(),
            "bulk import finished"
        );
        Ok(ImportReport { imported, errors })
    }

    /// Create a tag
    pub async fn create_tag(&self, workspace_id: i64, name: &str) -> Result<Tag> {
        validate_tag_name(name)?;
        self.store.create_tag(workspace_id, name.trim()).await
    }

    pub async fn list_tags(&self, workspace_id: i64) -> Result<Vec<Tag>> {
        self.store.list_tags(workspace_id).await
    }

    pub async fn delete_tag(&self, workspace_id: i64, tag_id: i64) -> Result<()> {
        if self.store.delete_tag(workspace_id, tag_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("tag {tag_id}")))
        }
    }

    async fn ensure_tags(&self, workspace_id: i64, tag_ids: &[i64]) -> Result<()> {
        if tag_ids.is_empty() {
            return Ok(());
        }
        if self.store.tags_exist(workspace_id, tag_ids).await? {
            Ok(())
        } else {
            Err(Error::Validation(
                "one or more tag ids do not belong to this workspace".to_string(),
            ))
        }
    }

    async fn ensure_content_quota(&self, workspace: &Workspace, adding: i64) -> Result<()> {
        if let Some(quota) = workspace.content_quota {
            let live = self.store.count_content(workspace.id, false).await?;
            if live + adding > quota {
                return Err(Error::ContentQuotaExceeded {
                    workspace_id: workspace.id,
                    quota,
                });
            }
        }
        Ok(())
    }
}

/// What `delete` actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Row removed
    Deleted,
    /// Referenced by recent traces; archived instead
    Archived,
}
