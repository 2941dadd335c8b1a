//! # Storage Abstraction
//!
//! Async traits between the core and its durable backend. The Postgres
//! implementation lives in `aaq-storage-postgres`; tests use the in-memory
//! implementations from `test-utils`.
//!
//! Every trait is workspace-scoped: implementations must never return rows
//! belonging to another workspace, and lookups take the workspace id
//! explicitly so cross-tenant access cannot be expressed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analytics::{PeriodTotals, TimeFrequency, TimeSeriesPoint, TopContentRow};
use crate::model::{
    Content, ContentUpdate, FeedbackSentiment, NewContent, NewWorkspace, QueryTrace,
    ResponseFeedback, Tag, UrgencyQueryTrace, UrgencyRule, User, UserRole, UserWorkspaceLink,
    Workspace,
};
use crate::Result;

/// Filters for content listing
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub skip: i64,
    pub limit: i64,
    /// Only content carrying all of these tags
    pub tag_ids: Vec<i64>,
    /// Case-insensitive substring match over title + text
    pub search_text: Option<String>,
    pub include_archived: bool,
}

/// Users, workspaces, membership links and API keys
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a user; fails `AlreadyExists` on a username clash
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Update username and/or password hash; `None` preserves the field
    async fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User>;

    /// Create a workspace; fails `AlreadyExists` on a name clash
    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace>;

    async fn get_workspace(&self, id: i64) -> Result<Option<Workspace>>;

    /// Update quota fields; `None` preserves the field
    async fn update_workspace_quotas(
        &self,
        id: i64,
        content_quota: Option<Option<i64>>,
        api_daily_quota: Option<Option<i64>>,
    ) -> Result<Workspace>;

    /// Add or update a membership link
    async fn upsert_link(&self, link: &UserWorkspaceLink) -> Result<()>;

    async fn get_link(&self, user_id: i64, workspace_id: i64)
        -> Result<Option<UserWorkspaceLink>>;

    async fn list_links_for_user(&self, user_id: i64) -> Result<Vec<UserWorkspaceLink>>;

    /// Remove a membership; fails `Validation` when it would leave the
    /// workspace without an admin
    async fn remove_link(&self, user_id: i64, workspace_id: i64) -> Result<()>;

    /// Number of admins in a workspace
    async fn count_admins(&self, workspace_id: i64) -> Result<i64>;

    /// Atomically make `workspace_id` the user's default, clearing any other
    /// default in the same transaction
    async fn set_default_workspace(&self, user_id: i64, workspace_id: i64) -> Result<()>;

    /// Replace the workspace API key hash; the old key becomes invalid in
    /// the same statement. Serialized per workspace by the implementation.
    async fn replace_api_key(
        &self,
        workspace_id: i64,
        key_hash: &str,
        first_characters: &str,
    ) -> Result<()>;

    /// Resolve a workspace from an API key hash and stamp `last_used_at`
    async fn find_workspace_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Workspace>>;

    /// Role of the user inside the workspace, if any
    async fn role_in_workspace(&self, user_id: i64, workspace_id: i64)
        -> Result<Option<UserRole>> {
        Ok(self.get_link(user_id, workspace_id).await?.map(|l| l.role))
    }
}

/// Content items and tags
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a content row with its embedding in one transaction
    async fn create_content(
        &self,
        workspace_id: i64,
        content: &NewContent,
        embedding: Vec<f32>,
    ) -> Result<Content>;

    async fn get_content(&self, workspace_id: i64, id: i64) -> Result<Option<Content>>;

    /// Apply a partial update; when `embedding` is `Some` it replaces the
    /// stored vector in the same transaction
    async fn update_content(
        &self,
        workspace_id: i64,
        id: i64,
        update: &ContentUpdate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content>;

    /// Flip the archived flag; the embedding is left untouched
    async fn set_archived(&self, workspace_id: i64, id: i64, archived: bool) -> Result<Content>;

    /// Hard-delete a row; returns `false` when it does not exist
    async fn delete_content(&self, workspace_id: i64, id: i64) -> Result<bool>;

    async fn list_content(&self, workspace_id: i64, filter: &ContentFilter)
        -> Result<Vec<Content>>;

    /// Count rows; `include_archived=false` counts live rows only
    async fn count_content(&self, workspace_id: i64, include_archived: bool) -> Result<i64>;

    /// `(content_id, embedding)` for every non-archived row; feeds the
    /// exact retrieval path
    async fn list_active_embeddings(&self, workspace_id: i64) -> Result<Vec<(i64, Vec<f32>)>>;

    /// Backend-side approximate nearest-neighbour search over non-archived
    /// rows, ordered by similarity descending then id ascending. Returns
    /// `(content_id, cosine_similarity)`.
    async fn approx_search(
        &self,
        workspace_id: i64,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f32)>>;

    /// Hydrate rows by id, preserving the input order
    async fn get_contents_by_ids(&self, workspace_id: i64, ids: &[i64]) -> Result<Vec<Content>>;

    /// Which of `titles` already exist among non-archived rows
    async fn existing_titles(&self, workspace_id: i64, titles: &[String]) -> Result<Vec<String>>;

    /// Which of `texts` already exist among non-archived rows
    async fn existing_texts(&self, workspace_id: i64, texts: &[String]) -> Result<Vec<String>>;

    /// Bump a vote counter
    async fn record_vote(
        &self,
        workspace_id: i64,
        content_id: i64,
        sentiment: FeedbackSentiment,
    ) -> Result<()>;

    /// Create a tag; fails `AlreadyExists` on a per-workspace name clash
    async fn create_tag(&self, workspace_id: i64, name: &str) -> Result<Tag>;

    async fn list_tags(&self, workspace_id: i64) -> Result<Vec<Tag>>;

    async fn delete_tag(&self, workspace_id: i64, id: i64) -> Result<bool>;

    /// Whether every id in `ids` names a tag of this workspace
    async fn tags_exist(&self, workspace_id: i64, ids: &[i64]) -> Result<bool>;
}

/// Query traces and feedback
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Insert a trace row. Called before any generation side effects.
    async fn insert_trace(&self, trace: &QueryTrace) -> Result<()>;

    /// One-shot attachment of the generated response and final pipeline
    /// annotations; a second call is a no-op
    async fn attach_response(
        &self,
        query_id: Uuid,
        response: &str,
        pipeline_states: &[String],
    ) -> Result<()>;

    async fn get_trace(&self, workspace_id: i64, query_id: Uuid) -> Result<Option<QueryTrace>>;

    /// Look up a trace by id alone; used by the capability-key feedback path
    async fn get_trace_any_workspace(&self, query_id: Uuid) -> Result<Option<QueryTrace>>;

    /// Insert response feedback; returns `false` when the same sentiment was
    /// already recorded for the query (idempotent no-op)
    async fn insert_response_feedback(&self, feedback: &ResponseFeedback) -> Result<bool>;

    /// Insert content feedback; returns `false` on a duplicate
    /// `(query_id, content_id, sentiment)`
    async fn insert_content_feedback(
        &self,
        feedback: &crate::model::ContentFeedback,
    ) -> Result<bool>;

    /// Whether any trace created after `since` references the content
    async fn content_referenced_since(
        &self,
        workspace_id: i64,
        content_id: i64,
        since: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Urgency rules and detection traces
#[async_trait]
pub trait UrgencyStore: Send + Sync {
    async fn create_rule(
        &self,
        workspace_id: i64,
        text: &str,
        embedding: Vec<f32>,
    ) -> Result<UrgencyRule>;

    async fn list_rules(&self, workspace_id: i64) -> Result<Vec<UrgencyRule>>;

    async fn delete_rule(&self, workspace_id: i64, id: i64) -> Result<bool>;

    async fn insert_urgency_trace(&self, trace: &UrgencyQueryTrace) -> Result<()>;
}

/// Read-side aggregates over traces; feeds the dashboard
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Query/feedback/urgency totals inside `[from, to)`
    async fn period_totals(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodTotals>;

    /// Query counts bucketed at `frequency` inside `[from, to)`
    async fn query_timeseries(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        frequency: TimeFrequency,
    ) -> Result<Vec<TimeSeriesPoint>>;

    /// Most-referenced content inside `[from, to)`
    async fn top_content(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TopContentRow>>;

    /// `(query_text, query_embedding)` of recent traces, newest first
    async fn recent_query_embeddings(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<f32>)>>;

    /// Persist the latest topic-clustering result as opaque JSON
    async fn save_topic_insights(&self, workspace_id: i64, payload: &serde_json::Value)
        -> Result<()>;

    async fn load_topic_insights(&self, workspace_id: i64) -> Result<Option<serde_json::Value>>;
}
