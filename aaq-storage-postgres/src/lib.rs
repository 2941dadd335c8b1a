//! # Postgres Storage Backend
//!
//! `sqlx`-based implementations of the `aaq-core` storage traits over
//! Postgres with the pgvector extension. One [`PostgresStore`] value wraps
//! the shared connection pool and implements every trait; multi-table writes
//! run in a single transaction and workspace-scoped exclusive operations
//! (API key rotation, default-workspace flips) serialize on their anchor row
//! with `SELECT ... FOR UPDATE`.

pub mod analytics;
pub mod content;
pub mod identity;
pub mod schema;
pub mod trace;
pub mod urgency;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use aaq_core::model::{Content, Workspace};
use aaq_core::{Error, Result};

/// Shared store over the Postgres pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    /// Vector dimension the schema was created with
    dimension: usize,
}

impl PostgresStore {
    /// Connect, apply the schema and return the store
    pub async fn connect(database_url: &str, pool_size: u32, dimension: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(database_url)
            .await
            .map_err(|e| Error::Database(format!("failed to connect: {e}")))?;

        schema::migrate(&pool, dimension).await?;
        tracing::info!(pool_size, dimension, "connected to Postgres");

        Ok(Self { pool, dimension })
    }

    /// Wrap an existing pool (tests, shared pools); does not run migrations
    #[must_use]
    pub fn from_pool(pool: PgPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Map a sqlx error onto the core taxonomy, turning unique violations into
/// `AlreadyExists`
pub(crate) fn db_err(context: &str, e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return Error::AlreadyExists(context.to_string());
        }
        if db.is_foreign_key_violation() {
            return Error::Validation(format!("{context}: referenced row does not exist"));
        }
    }
    Error::Database(format!("{context}: {e}"))
}

pub(crate) fn map_workspace(row: &sqlx::postgres::PgRow) -> Result<Workspace> {
    Ok(Workspace {
        id: row.try_get("id").map_err(|e| db_err("workspace.id", e))?,
        name: row.try_get("name").map_err(|e| db_err("workspace.name", e))?,
        content_quota: row
            .try_get("content_quota")
            .map_err(|e| db_err("workspace.content_quota", e))?,
        api_daily_quota: row
            .try_get("api_daily_quota")
            .map_err(|e| db_err("workspace.api_daily_quota", e))?,
        api_key_first_characters: row
            .try_get("api_key_first_characters")
            .map_err(|e| db_err("workspace.api_key_first_characters", e))?,
        api_key_updated_at: row
            .try_get("api_key_updated_at")
            .map_err(|e| db_err("workspace.api_key_updated_at", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_err("workspace.created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| db_err("workspace.updated_at", e))?,
    })
}

pub(crate) fn map_content(row: &sqlx::postgres::PgRow) -> Result<Content> {
    let embedding: pgvector::Vector = row
        .try_get("embedding")
        .map_err(|e| db_err("content.embedding", e))?;
    Ok(Content {
        id: row.try_get("id").map_err(|e| db_err("content.id", e))?,
        workspace_id: row
            .try_get("workspace_id")
            .map_err(|e| db_err("content.workspace_id", e))?,
        title: row.try_get("title").map_err(|e| db_err("content.title", e))?,
        text: row
            .try_get("content_text")
            .map_err(|e| db_err("content.content_text", e))?,
        metadata: row
            .try_get("metadata")
            .map_err(|e| db_err("content.metadata", e))?,
        tag_ids: row
            .try_get("tag_ids")
            .map_err(|e| db_err("content.tag_ids", e))?,
        is_archived: row
            .try_get("is_archived")
            .map_err(|e| db_err("content.is_archived", e))?,
        positive_votes: row
            .try_get("positive_votes")
            .map_err(|e| db_err("content.positive_votes", e))?,
        negative_votes: row
            .try_get("negative_votes")
            .map_err(|e| db_err("content.negative_votes", e))?,
        embedding: embedding.to_vec(),
        created_at: row
            .try_get("created_at")
            .map_err(|e| db_err("content.created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| db_err("content.updated_at", e))?,
    })
}
