//! Top-K semantic retrieval over a workspace's content.
//!
//! The engine is stateless: every call embeds the query (or reuses a
//! provided vector), scores non-archived content by cosine similarity and
//! returns the top `k` with deterministic ordering. Small workspaces are
//! scored exactly in-process; larger ones go through the backend's
//! approximate index.

use std::sync::Arc;

use crate::config::RetrievalSettings;
use crate::embeddings::{rank_by_similarity, EmbeddingService};
use crate::model::{Content, RetrievedItem};
use crate::storage::ContentStore;
use crate::Result;

/// One scored retrieval hit, carrying the full content row
#[derive(Debug, Clone)]
pub struct ScoredContent {
    pub content: Content,
    /// Cosine similarity in `[-1, 1]`
    pub similarity: f32,
}

impl ScoredContent {
    /// Shape returned to API callers
    #[must_use]
    pub fn to_item(&self) -> RetrievedItem {
        RetrievedItem {
            id: self.content.id,
            title: self.content.title.clone(),
            text: self.content.text.clone(),
            distance: 1.0 - self.similarity,
        }
    }
}

/// Result of one retrieval run
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// The embedded query; recorded on the trace and reused by guardrails
    pub query_embedding: Vec<f32>,
    /// Ranked hits, best first
    pub hits: Vec<ScoredContent>,
}

/// Stateless retrieval engine
pub struct RetrievalEngine {
    store: Arc<dyn ContentStore>,
    embeddings: Arc<EmbeddingService>,
    settings: RetrievalSettings,
}

impl RetrievalEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn ContentStore>,
        embeddings: Arc<EmbeddingService>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            store,
            embeddings,
            settings,
        }
    }

    /// Embed `query_text` and return the top `k` non-archived hits
    pub async fn search(
        &self,
        workspace_id: i64,
        query_text: &str,
        k: usize,
    ) -> Result<RetrievalOutcome> {
        let query_embedding = self.embeddings.embed(query_text).await?;
        let hits = self
            .search_with_embedding(workspace_id, &query_embedding, k)
            .await?;
        Ok(RetrievalOutcome {
            query_embedding,
            hits,
        })
    }

    /// Score an already-embedded query
    pub async fn search_with_embedding(
        &self,
        workspace_id: i64,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredContent>> {
        let live_count = self.store.count_content(workspace_id, false).await?;
        if live_count == 0 {
            return Ok(Vec::new());
        }

        let ranked: Vec<(i64, f32)> = if live_count <= self.settings.exact_search_threshold {
            let candidates = self.store.list_active_embeddings(workspace_id).await?;
            rank_by_similarity(query, &candidates, k)
        } else {
            self.store.approx_search(workspace_id, query, k).await?
        };

        let floor = self.settings.similarity_floor;
        let ranked: Vec<(i64, f32)> = ranked
            .into_iter()
            .filter(|(_, similarity)| floor <= 0.0 || *similarity >= floor)
            .collect();

        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
        let contents = self.store.get_contents_by_ids(workspace_id, &ids).await?;
        let mut by_id: std::collections::HashMap<i64, Content> =
            contents.into_iter().map(|c| (c.id, c)).collect();

        // Rows deleted between ranking and hydration simply drop out
        let hits = ranked
            .into_iter()
            .filter_map(|(id, similarity)| {
                by_id.remove(&id).map(|content| ScoredContent {
                    content,
                    similarity,
                })
            })
            .collect();

        Ok(hits)
    }
}
