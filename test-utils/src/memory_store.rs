//! In-memory implementation of every storage trait.
//!
//! Mirrors the Postgres semantics closely enough for pipeline and router
//! tests: uniqueness rules, idempotent feedback, vote counters, analytics
//! aggregates. State lives behind one mutex; methods never await while
//! holding it.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use aaq_core::analytics::{PeriodTotals, TimeFrequency, TimeSeriesPoint, TopContentRow};
use aaq_core::embeddings::rank_by_similarity;
use aaq_core::model::{
    Content, ContentFeedback, ContentUpdate, FeedbackSentiment, NewContent, NewWorkspace,
    QueryTrace, ResponseFeedback, Tag, UrgencyQueryTrace, UrgencyRule, User, UserRole,
    UserWorkspaceLink, Workspace,
};
use aaq_core::storage::{
    AnalyticsStore, ContentFilter, ContentStore, IdentityStore, TraceStore, UrgencyStore,
};
use aaq_core::{Error, Result};

#[derive(Default)]
struct State {
    users: HashMap<i64, User>,
    next_user_id: i64,
    workspaces: HashMap<i64, Workspace>,
    api_key_hashes: HashMap<i64, String>,
    next_workspace_id: i64,
    links: Vec<UserWorkspaceLink>,
    contents: HashMap<i64, Content>,
    next_content_id: i64,
    tags: HashMap<i64, Tag>,
    next_tag_id: i64,
    traces: HashMap<Uuid, QueryTrace>,
    response_feedback: Vec<ResponseFeedback>,
    content_feedback: Vec<ContentFeedback>,
    urgency_rules: HashMap<i64, UrgencyRule>,
    next_rule_id: i64,
    urgency_traces: Vec<UrgencyQueryTrace>,
    topic_insights: HashMap<i64, serde_json::Value>,
}

/// Shared in-memory store implementing all storage traits
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Direct read access for assertions
    pub fn trace_count(&self, workspace_id: i64) -> usize {
        self.state
            .lock()
            .traces
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .count()
    }

    /// Response feedback rows for assertions
    pub fn response_feedback_rows(&self, query_id: Uuid) -> Vec<ResponseFeedback> {
        self.state
            .lock()
            .response_feedback
            .iter()
            .filter(|f| f.query_id == query_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let mut state = self.state.lock();
        if state.users.values().any(|u| u.username == username) {
            return Err(Error::AlreadyExists(format!("username {username}")));
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn update_user(
        &self,
        id: i64,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<User> {
        let mut state = self.state.lock();
        if let Some(new_name) = username {
            if state
                .users
                .values()
                .any(|u| u.username == new_name && u.id != id)
            {
                return Err(Error::AlreadyExists(format!("username {new_name}")));
            }
        }
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        if let Some(new_name) = username {
            user.username = new_name.to_string();
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash.to_string();
        }
        Ok(user.clone())
    }

    async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace> {
        let mut state = self.state.lock();
        if state.workspaces.values().any(|w| w.name == workspace.name) {
            return Err(Error::AlreadyExists(format!("workspace {}", workspace.name)));
        }
        state.next_workspace_id += 1;
        let now = Utc::now();
        let row = Workspace {
            id: state.next_workspace_id,
            name: workspace.name.clone(),
            content_quota: workspace.content_quota,
            api_daily_quota: workspace.api_daily_quota,
            api_key_first_characters: None,
            api_key_updated_at: None,
            created_at: now,
            updated_at: now,
        };
        state.workspaces.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_workspace(&self, id: i64) -> Result<Option<Workspace>> {
        Ok(self.state.lock().workspaces.get(&id).cloned())
    }

    async fn update_workspace_quotas(
        &self,
        id: i64,
        content_quota: Option<Option<i64>>,
        api_daily_quota: Option<Option<i64>>,
    ) -> Result<Workspace> {
        let mut state = self.state.lock();
        let workspace = state
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("workspace {id}")))?;
        if let Some(quota) = content_quota {
            workspace.content_quota = quota;
        }
        if let Some(quota) = api_daily_quota {
            workspace.api_daily_quota = quota;
        }
        workspace.updated_at = Utc::now();
        Ok(workspace.clone())
    }

    async fn upsert_link(&self, link: &UserWorkspaceLink) -> Result<()> {
        let mut state = self.state.lock();
        state
            .links
            .retain(|l| !(l.user_id == link.user_id && l.workspace_id == link.workspace_id));
        if link.is_default {
            for other in state
                .links
                .iter_mut()
                .filter(|l| l.user_id == link.user_id)
            {
                other.is_default = false;
            }
        }
        state.links.push(link.clone());
        Ok(())
    }

    async fn get_link(
        &self,
        user_id: i64,
        workspace_id: i64,
    ) -> Result<Option<UserWorkspaceLink>> {
        Ok(self
            .state
            .lock()
            .links
            .iter()
            .find(|l| l.user_id == user_id && l.workspace_id == workspace_id)
            .cloned())
    }

    async fn list_links_for_user(&self, user_id: i64) -> Result<Vec<UserWorkspaceLink>> {
        Ok(self
            .state
            .lock()
            .links
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_link(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        let is_admin = state
            .links
            .iter()
            .any(|l| {
                l.user_id == user_id
                    && l.workspace_id == workspace_id
                    && l.role == UserRole::Admin
            });
        if is_admin {
            let admins = state
                .links
                .iter()
                .filter(|l| l.workspace_id == workspace_id && l.role == UserRole::Admin)
                .count();
            if admins <= 1 {
                return Err(Error::Validation(
                    "cannot remove the last admin of a workspace".to_string(),
                ));
            }
        }
        state
            .links
            .retain(|l| !(l.user_id == user_id && l.workspace_id == workspace_id));
        Ok(())
    }

    async fn count_admins(&self, workspace_id: i64) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .links
            .iter()
            .filter(|l| l.workspace_id == workspace_id && l.role == UserRole::Admin)
            .count() as i64)
    }

    async fn set_default_workspace(&self, user_id: i64, workspace_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        if !state
            .links
            .iter()
            .any(|l| l.user_id == user_id && l.workspace_id == workspace_id)
        {
            return Err(Error::NotFound(format!(
                "user {user_id} has no link to workspace {workspace_id}"
            )));
        }
        for link in state.links.iter_mut().filter(|l| l.user_id == user_id) {
            link.is_default = link.workspace_id == workspace_id;
        }
        Ok(())
    }

    async fn replace_api_key(
        &self,
        workspace_id: i64,
        key_hash: &str,
        first_characters: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if !state.workspaces.contains_key(&workspace_id) {
            return Err(Error::NotFound(format!("workspace {workspace_id}")));
        }
        state
            .api_key_hashes
            .insert(workspace_id, key_hash.to_string());
        let workspace = state
            .workspaces
            .get_mut(&workspace_id)
            .ok_or_else(|| Error::NotFound(format!("workspace {workspace_id}")))?;
        workspace.api_key_first_characters = Some(first_characters.to_string());
        workspace.api_key_updated_at = Some(Utc::now());
        Ok(())
    }

    async fn find_workspace_by_api_key_hash(&self, key_hash: &str) -> Result<Option<Workspace>> {
        let state = self.state.lock();
        Ok(state
            .api_key_hashes
            .iter()
            .find(|(_, hash)| hash.as_str() == key_hash)
            .and_then(|(id, _)| state.workspaces.get(id).cloned()))
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn create_content(
        &self,
        workspace_id: i64,
        content: &NewContent,
        embedding: Vec<f32>,
    ) -> Result<Content> {
        let mut state = self.state.lock();
        if state.contents.values().any(|c| {
            c.workspace_id == workspace_id && !c.is_archived && c.title == content.title
        }) {
            return Err(Error::AlreadyExists(format!("content title {}", content.title)));
        }
        state.next_content_id += 1;
        let now = Utc::now();
        let row = Content {
            id: state.next_content_id,
            workspace_id,
            title: content.title.clone(),
            text: content.text.clone(),
            metadata: content.metadata.clone(),
            tag_ids: content.tag_ids.clone(),
            is_archived: false,
            positive_votes: 0,
            negative_votes: 0,
            embedding,
            created_at: now,
            updated_at: now,
        };
        state.contents.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_content(&self, workspace_id: i64, id: i64) -> Result<Option<Content>> {
        Ok(self
            .state
            .lock()
            .contents
            .get(&id)
            .filter(|c| c.workspace_id == workspace_id)
            .cloned())
    }

    async fn update_content(
        &self,
        workspace_id: i64,
        id: i64,
        update: &ContentUpdate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content> {
        let mut state = self.state.lock();
        let content = state
            .contents
            .get_mut(&id)
            .filter(|c| c.workspace_id == workspace_id)
            .ok_or_else(|| Error::NotFound(format!("content {id}")))?;
        if let Some(title) = &update.title {
            content.title = title.clone();
        }
        if let Some(text) = &update.text {
            content.text = text.clone();
        }
        if let Some(metadata) = &update.metadata {
            content.metadata = metadata.clone();
        }
        if let Some(tag_ids) = &update.tag_ids {
            content.tag_ids = tag_ids.clone();
        }
        if let Some(embedding) = embedding {
            content.embedding = embedding;
        }
        content.updated_at = Utc::now();
        Ok(content.clone())
    }

    async fn set_archived(&self, workspace_id: i64, id: i64, archived: bool) -> Result<Content> {
        let mut state = self.state.lock();
        let content = state
            .contents
            .get_mut(&id)
            .filter(|c| c.workspace_id == workspace_id)
            .ok_or_else(|| Error::NotFound(format!("content {id}")))?;
        content.is_archived = archived;
        content.updated_at = Utc::now();
        Ok(content.clone())
    }

    async fn delete_content(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let mut state = self.state.lock();
        let existed = state
            .contents
            .get(&id)
            .is_some_and(|c| c.workspace_id == workspace_id);
        if existed {
            state.contents.remove(&id);
        }
        Ok(existed)
    }

    async fn list_content(
        &self,
        workspace_id: i64,
        filter: &ContentFilter,
    ) -> Result<Vec<Content>> {
        let state = self.state.lock();
        let needle = filter.search_text.as_ref().map(|s| s.to_lowercase());
        let mut rows: Vec<Content> = state
            .contents
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .filter(|c| filter.include_archived || !c.is_archived)
            .filter(|c| {
                filter.tag_ids.is_empty()
                    || filter.tag_ids.iter().all(|t| c.tag_ids.contains(t))
            })
            .filter(|c| {
                needle.as_ref().is_none_or(|needle| {
                    c.title.to_lowercase().contains(needle)
                        || c.text.to_lowercase().contains(needle)
                })
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.id);
        let skip = usize::try_from(filter.skip).unwrap_or(0);
        let limit = if filter.limit <= 0 {
            usize::MAX
        } else {
            filter.limit as usize
        };
        Ok(rows.into_iter().skip(skip).take(limit).collect())
    }

    async fn count_content(&self, workspace_id: i64, include_archived: bool) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .contents
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .filter(|c| include_archived || !c.is_archived)
            .count() as i64)
    }

    async fn list_active_embeddings(&self, workspace_id: i64) -> Result<Vec<(i64, Vec<f32>)>> {
        Ok(self
            .state
            .lock()
            .contents
            .values()
            .filter(|c| c.workspace_id == workspace_id && !c.is_archived)
            .map(|c| (c.id, c.embedding.clone()))
            .collect())
    }

    async fn approx_search(
        &self,
        workspace_id: i64,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(i64, f32)>> {
        let candidates = self.list_active_embeddings(workspace_id).await?;
        Ok(rank_by_similarity(query, &candidates, k))
    }

    async fn get_contents_by_ids(&self, workspace_id: i64, ids: &[i64]) -> Result<Vec<Content>> {
        let state = self.state.lock();
        Ok(ids
            .iter()
            .filter_map(|id| {
                state
                    .contents
                    .get(id)
                    .filter(|c| c.workspace_id == workspace_id)
                    .cloned()
            })
            .collect())
    }

    async fn existing_titles(&self, workspace_id: i64, titles: &[String]) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(titles
            .iter()
            .filter(|t| {
                state.contents.values().any(|c| {
                    c.workspace_id == workspace_id && !c.is_archived && c.title == **t
                })
            })
            .cloned()
            .collect())
    }

    async fn existing_texts(&self, workspace_id: i64, texts: &[String]) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(texts
            .iter()
            .filter(|t| {
                state.contents.values().any(|c| {
                    c.workspace_id == workspace_id && !c.is_archived && c.text == **t
                })
            })
            .cloned()
            .collect())
    }

    async fn record_vote(
        &self,
        workspace_id: i64,
        content_id: i64,
        sentiment: FeedbackSentiment,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let content = state
            .contents
            .get_mut(&content_id)
            .filter(|c| c.workspace_id == workspace_id)
            .ok_or_else(|| Error::NotFound(format!("content {content_id}")))?;
        match sentiment {
            FeedbackSentiment::Positive => content.positive_votes += 1,
            FeedbackSentiment::Negative => content.negative_votes += 1,
        }
        Ok(())
    }

    async fn create_tag(&self, workspace_id: i64, name: &str) -> Result<Tag> {
        let mut state = self.state.lock();
        if state
            .tags
            .values()
            .any(|t| t.workspace_id == workspace_id && t.name == name)
        {
            return Err(Error::AlreadyExists(format!("tag {name}")));
        }
        state.next_tag_id += 1;
        let tag = Tag {
            id: state.next_tag_id,
            workspace_id,
            name: name.to_string(),
        };
        state.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self, workspace_id: i64) -> Result<Vec<Tag>> {
        let mut tags: Vec<Tag> = self
            .state
            .lock()
            .tags
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect();
        tags.sort_by_key(|t| t.id);
        Ok(tags)
    }

    async fn delete_tag(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let mut state = self.state.lock();
        let existed = state
            .tags
            .get(&id)
            .is_some_and(|t| t.workspace_id == workspace_id);
        if existed {
            state.tags.remove(&id);
            for content in state.contents.values_mut() {
                content.tag_ids.retain(|t| *t != id);
            }
        }
        Ok(existed)
    }

    async fn tags_exist(&self, workspace_id: i64, ids: &[i64]) -> Result<bool> {
        let state = self.state.lock();
        Ok(ids.iter().all(|id| {
            state
                .tags
                .get(id)
                .is_some_and(|t| t.workspace_id == workspace_id)
        }))
    }
}

#[async_trait]
impl TraceStore for InMemoryStore {
    async fn insert_trace(&self, trace: &QueryTrace) -> Result<()> {
        self.state.lock().traces.insert(trace.id, trace.clone());
        Ok(())
    }

    async fn attach_response(
        &self,
        query_id: Uuid,
        response: &str,
        pipeline_states: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock();
        let trace = state
            .traces
            .get_mut(&query_id)
            .ok_or(Error::TraceNotFound(query_id))?;
        if trace.generated_llm_response.is_none() {
            trace.generated_llm_response = Some(response.to_string());
            trace.pipeline_states = pipeline_states.to_vec();
        }
        Ok(())
    }

    async fn get_trace(&self, workspace_id: i64, query_id: Uuid) -> Result<Option<QueryTrace>> {
        Ok(self
            .state
            .lock()
            .traces
            .get(&query_id)
            .filter(|t| t.workspace_id == workspace_id)
            .cloned())
    }

    async fn get_trace_any_workspace(&self, query_id: Uuid) -> Result<Option<QueryTrace>> {
        Ok(self.state.lock().traces.get(&query_id).cloned())
    }

    async fn insert_response_feedback(&self, feedback: &ResponseFeedback) -> Result<bool> {
        let mut state = self.state.lock();
        let duplicate = state
            .response_feedback
            .iter()
            .any(|f| f.query_id == feedback.query_id && f.sentiment == feedback.sentiment);
        if duplicate {
            return Ok(false);
        }
        state.response_feedback.push(feedback.clone());
        Ok(true)
    }

    async fn insert_content_feedback(&self, feedback: &ContentFeedback) -> Result<bool> {
        let mut state = self.state.lock();
        let duplicate = state.content_feedback.iter().any(|f| {
            f.query_id == feedback.query_id
                && f.content_id == feedback.content_id
                && f.sentiment == feedback.sentiment
        });
        if duplicate {
            return Ok(false);
        }
        state.content_feedback.push(feedback.clone());
        Ok(true)
    }

    async fn content_referenced_since(
        &self,
        workspace_id: i64,
        content_id: i64,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.state.lock().traces.values().any(|t| {
            t.workspace_id == workspace_id
                && t.created_at >= since
                && t.retrieved.iter().any(|r| r.content_id == content_id)
        }))
    }
}

#[async_trait]
impl UrgencyStore for InMemoryStore {
    async fn create_rule(
        &self,
        workspace_id: i64,
        text: &str,
        embedding: Vec<f32>,
    ) -> Result<UrgencyRule> {
        let mut state = self.state.lock();
        state.next_rule_id += 1;
        let rule = UrgencyRule {
            id: state.next_rule_id,
            workspace_id,
            text: text.to_string(),
            embedding,
            created_at: Utc::now(),
        };
        state.urgency_rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn list_rules(&self, workspace_id: i64) -> Result<Vec<UrgencyRule>> {
        let mut rules: Vec<UrgencyRule> = self
            .state
            .lock()
            .urgency_rules
            .values()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn delete_rule(&self, workspace_id: i64, id: i64) -> Result<bool> {
        let mut state = self.state.lock();
        let existed = state
            .urgency_rules
            .get(&id)
            .is_some_and(|r| r.workspace_id == workspace_id);
        if existed {
            state.urgency_rules.remove(&id);
        }
        Ok(existed)
    }

    async fn insert_urgency_trace(&self, trace: &UrgencyQueryTrace) -> Result<()> {
        self.state.lock().urgency_traces.push(trace.clone());
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for InMemoryStore {
    async fn period_totals(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PeriodTotals> {
        let state = self.state.lock();
        let in_range =
            |at: DateTime<Utc>| at >= from && at < to;

        let trace_ids: Vec<Uuid> = state
            .traces
            .values()
            .filter(|t| t.workspace_id == workspace_id && in_range(t.created_at))
            .map(|t| t.id)
            .collect();

        let workspace_trace = |query_id: Uuid| {
            state
                .traces
                .get(&query_id)
                .is_some_and(|t| t.workspace_id == workspace_id)
        };

        Ok(PeriodTotals {
            query_count: trace_ids.len() as i64,
            upvotes: state
                .response_feedback
                .iter()
                .filter(|f| {
                    workspace_trace(f.query_id)
                        && in_range(f.created_at)
                        && f.sentiment == FeedbackSentiment::Positive
                })
                .count() as i64,
            downvotes: state
                .response_feedback
                .iter()
                .filter(|f| {
                    workspace_trace(f.query_id)
                        && in_range(f.created_at)
                        && f.sentiment == FeedbackSentiment::Negative
                })
                .count() as i64,
            urgent_count: state
                .urgency_traces
                .iter()
                .filter(|t| t.workspace_id == workspace_id && in_range(t.created_at) && t.is_urgent)
                .count() as i64,
        })
    }

    async fn query_timeseries(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        frequency: TimeFrequency,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let state = self.state.lock();
        let mut buckets: HashMap<DateTime<Utc>, i64> = HashMap::new();
        for trace in state.traces.values().filter(|t| {
            t.workspace_id == workspace_id && t.created_at >= from && t.created_at < to
        }) {
            *buckets
                .entry(bucket_start(trace.created_at, frequency))
                .or_insert(0) += 1;
        }
        let mut points: Vec<TimeSeriesPoint> = buckets
            .into_iter()
            .map(|(bucket_start, count)| TimeSeriesPoint {
                bucket_start,
                count,
            })
            .collect();
        points.sort_by_key(|p| p.bucket_start);
        Ok(points)
    }

    async fn top_content(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TopContentRow>> {
        let state = self.state.lock();
        let mut counts: HashMap<i64, i64> = HashMap::new();
        for trace in state.traces.values().filter(|t| {
            t.workspace_id == workspace_id && t.created_at >= from && t.created_at < to
        }) {
            for reference in &trace.retrieved {
                *counts.entry(reference.content_id).or_insert(0) += 1;
            }
        }

        let mut rows: Vec<TopContentRow> = counts
            .into_iter()
            .filter_map(|(content_id, query_count)| {
                state.contents.get(&content_id).map(|c| TopContentRow {
                    content_id,
                    title: c.display_title(),
                    query_count,
                    positive_votes: c.positive_votes,
                    negative_votes: c.negative_votes,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.query_count
                .cmp(&a.query_count)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recent_query_embeddings(
        &self,
        workspace_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<f32>)>> {
        let state = self.state.lock();
        let mut traces: Vec<&QueryTrace> = state
            .traces
            .values()
            .filter(|t| {
                t.workspace_id == workspace_id
                    && t.created_at >= from
                    && t.created_at < to
                    && !t.query_embedding.is_empty()
            })
            .collect();
        traces.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(traces
            .into_iter()
            .take(limit)
            .map(|t| (t.query_text.clone(), t.query_embedding.clone()))
            .collect())
    }

    async fn save_topic_insights(
        &self,
        workspace_id: i64,
        payload: &serde_json::Value,
    ) -> Result<()> {
        self.state
            .lock()
            .topic_insights
            .insert(workspace_id, payload.clone());
        Ok(())
    }

    async fn load_topic_insights(&self, workspace_id: i64) -> Result<Option<serde_json::Value>> {
        Ok(self.state.lock().topic_insights.get(&workspace_id).cloned())
    }
}

/// Truncate a timestamp to its bucket start
fn bucket_start(at: DateTime<Utc>, frequency: TimeFrequency) -> DateTime<Utc> {
    let date = at.date_naive();
    match frequency {
        TimeFrequency::Hour => Utc
            .with_ymd_and_hms(date.year(), date.month(), date.day(), at.time().hour(), 0, 0)
            .single()
            .unwrap_or(at),
        TimeFrequency::Day => Utc
            .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
            .single()
            .unwrap_or(at),
        TimeFrequency::Week => {
            let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            Utc.with_ymd_and_hms(monday.year(), monday.month(), monday.day(), 0, 0, 0)
                .single()
                .unwrap_or(at)
        }
        TimeFrequency::Month => Utc
            .with_ymd_and_hms(date.year(), date.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(at),
    }
}
