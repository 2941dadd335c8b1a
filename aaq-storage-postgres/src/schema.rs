//! Schema DDL.
//!
//! Idempotent statements applied at startup. The embedding columns are
//! dimensioned from configuration, so the DDL is generated rather than
//! static; everything else matches the documented persistence contract:
//! partial unique index on live content titles, per-workspace tag names,
//! an IVFFlat index for approximate search, and unique feedback keys.

use sqlx::postgres::PgPool;

use aaq_core::{Error, Result};

/// Apply the schema with `dimension`-sized vector columns
pub async fn migrate(pool: &PgPool, dimension: usize) -> Result<()> {
    for statement in statements(dimension) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .map_err(|e| Error::Database(format!("migration failed: {e}\n{statement}")))?;
    }
    tracing::info!("schema up to date");
    Ok(())
}

/// The DDL, in dependency order
#[must_use]
pub fn statements(dimension: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS workspaces (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(150) NOT NULL UNIQUE,
            content_quota BIGINT,
            api_daily_quota BIGINT,
            hashed_api_key TEXT,
            api_key_first_characters VARCHAR(5),
            api_key_updated_at TIMESTAMPTZ,
            api_key_last_used_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS user_workspace_links (
            user_id BIGINT NOT NULL REFERENCES users(id),
            workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
            role TEXT NOT NULL,
            is_default BOOLEAN NOT NULL DEFAULT false,
            PRIMARY KEY (user_id, workspace_id)
        )"
        .to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS ix_links_one_default_per_user
            ON user_workspace_links (user_id) WHERE is_default"
            .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS contents (
                id BIGSERIAL PRIMARY KEY,
                workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
                title VARCHAR(150) NOT NULL,
                content_text VARCHAR(2000) NOT NULL,
                metadata JSONB NOT NULL DEFAULT 'null',
                tag_ids BIGINT[] NOT NULL DEFAULT '{{}}',
                is_archived BOOLEAN NOT NULL DEFAULT false,
                positive_votes INT NOT NULL DEFAULT 0,
                negative_votes INT NOT NULL DEFAULT 0,
                embedding vector({dimension}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ),
        "CREATE UNIQUE INDEX IF NOT EXISTS ix_contents_live_title
            ON contents (workspace_id, title) WHERE NOT is_archived"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS ix_contents_workspace ON contents (workspace_id)".to_string(),
        "CREATE INDEX IF NOT EXISTS ix_contents_embedding
            ON contents USING ivfflat (embedding vector_cosine_ops) WITH (lists = 100)"
            .to_string(),
        "CREATE TABLE IF NOT EXISTS tags (
            id BIGSERIAL PRIMARY KEY,
            workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
            name VARCHAR(50) NOT NULL,
            UNIQUE (workspace_id, name)
        )"
        .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS query_traces (
                id UUID PRIMARY KEY,
                workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
                query_text TEXT NOT NULL,
                query_metadata JSONB NOT NULL DEFAULT 'null',
                generated_llm_response TEXT,
                feedback_secret_key TEXT NOT NULL,
                query_embedding vector({dimension}),
                pipeline_states JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ),
        "CREATE INDEX IF NOT EXISTS ix_traces_workspace_created
            ON query_traces (workspace_id, created_at)"
            .to_string(),
        "CREATE TABLE IF NOT EXISTS trace_content_refs (
            query_id UUID NOT NULL REFERENCES query_traces(id),
            content_id BIGINT NOT NULL,
            score REAL NOT NULL,
            rank INT NOT NULL,
            PRIMARY KEY (query_id, content_id)
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS response_feedback (
            id BIGSERIAL PRIMARY KEY,
            query_id UUID NOT NULL REFERENCES query_traces(id),
            sentiment TEXT NOT NULL,
            feedback_text TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (query_id, sentiment)
        )"
        .to_string(),
        "CREATE TABLE IF NOT EXISTS content_feedback (
            id BIGSERIAL PRIMARY KEY,
            query_id UUID NOT NULL REFERENCES query_traces(id),
            content_id BIGINT NOT NULL,
            sentiment TEXT NOT NULL,
            feedback_text TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (query_id, content_id, sentiment)
        )"
        .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS urgency_rules (
                id BIGSERIAL PRIMARY KEY,
                workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
                rule_text TEXT NOT NULL,
                embedding vector({dimension}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ),
        "CREATE TABLE IF NOT EXISTS urgency_query_traces (
            id UUID PRIMARY KEY,
            workspace_id BIGINT NOT NULL REFERENCES workspaces(id),
            query_text TEXT NOT NULL,
            is_urgent BOOLEAN NOT NULL,
            matched_rules JSONB NOT NULL DEFAULT '[]',
            failure_reason TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
        .to_string(),
        "CREATE INDEX IF NOT EXISTS ix_urgency_traces_workspace_created
            ON urgency_query_traces (workspace_id, created_at)"
            .to_string(),
        "CREATE TABLE IF NOT EXISTS topic_insights (
            workspace_id BIGINT PRIMARY KEY REFERENCES workspaces(id),
            payload JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
        .to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_embeds_the_configured_dimension() {
        let ddl = statements(1536).join("\n");
        assert!(ddl.contains("vector(1536)"));
        assert!(!ddl.contains("vector()"));
    }

    #[test]
    fn ddl_carries_the_uniqueness_contracts() {
        let ddl = statements(8).join("\n");
        assert!(ddl.contains("ix_contents_live_title"));
        assert!(ddl.contains("WHERE NOT is_archived"));
        assert!(ddl.contains("UNIQUE (workspace_id, name)"));
        assert!(ddl.contains("UNIQUE (query_id, sentiment)"));
        assert!(ddl.contains("ix_links_one_default_per_user"));
        assert!(ddl.contains("ivfflat"));
    }
}
