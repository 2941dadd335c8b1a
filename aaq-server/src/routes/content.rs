//! Content and CSV-import handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use aaq_core::model::{Content, ContentUpdate, ImportReport, NewContent, Workspace};
use aaq_core::storage::ContentFilter;
use aaq_core::{DeleteOutcome, Error};

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

async fn workspace_of(state: &AppState, authed: &AuthedUser) -> Result<Workspace, Error> {
    state
        .identity
        .get_workspace(authed.workspace_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("workspace {}", authed.workspace_id)))
}

pub async fn create_content(
    State(state): State<AppState>,
    authed: AuthedUser,
    Json(payload): Json<NewContent>,
) -> ApiResult<(StatusCode, Json<Content>)> {
    authed.require_admin()?;
    let workspace = workspace_of(&state, &authed).await?;
    let content = state.contents.create(&workspace, payload).await?;
    Ok((StatusCode::CREATED, Json(content)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListContentQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub limit: i64,
    /// Comma-separated tag ids; content must carry all of them
    pub tags: Option<String>,
    pub search_text: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn list_content(
    State(state): State<AppState>,
    authed: AuthedUser,
    Query(query): Query<ListContentQuery>,
) -> ApiResult<Json<Vec<Content>>> {
    let tag_ids = query
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|t| t.trim().parse().ok())
        .collect();

    let filter = ContentFilter {
        skip: query.skip,
        limit: if query.limit <= 0 { 50 } else { query.limit },
        tag_ids,
        search_text: query.search_text,
        include_archived: query.include_archived,
    };
    let contents = state.contents.list(authed.workspace_id, &filter).await?;
    Ok(Json(contents))
}

pub async fn get_content(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(content_id): Path<i64>,
) -> ApiResult<Json<Content>> {
    let content = state.contents.get(authed.workspace_id, content_id).await?;
    Ok(Json(content))
}

pub async fn update_content(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(content_id): Path<i64>,
    Json(payload): Json<ContentUpdate>,
) -> ApiResult<Json<Content>> {
    authed.require_admin()?;
    let workspace = workspace_of(&state, &authed).await?;
    let content = state
        .contents
        .update(&workspace, content_id, payload)
        .await?;
    Ok(Json(content))
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub is_archived: bool,
}

pub async fn set_archived(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(content_id): Path<i64>,
    Json(payload): Json<ArchiveRequest>,
) -> ApiResult<Json<Content>> {
    authed.require_admin()?;
    let content = if payload.is_archived {
        state.contents.archive(authed.workspace_id, content_id).await?
    } else {
        let workspace = workspace_of(&state, &authed).await?;
        state.contents.unarchive(&workspace, content_id).await?
    };
    Ok(Json(content))
}

pub async fn delete_content(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(content_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    authed.require_admin()?;
    let outcome = state
        .contents
        .delete(authed.workspace_id, content_id)
        .await?;
    let status = match outcome {
        DeleteOutcome::Deleted => "deleted",
        DeleteOutcome::Archived => "archived",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}

pub async fn csv_upload(
    State(state): State<AppState>,
    authed: AuthedUser,
    body: Bytes,
) -> ApiResult<Json<ImportReport>> {
    authed.require_admin()?;
    let workspace = workspace_of(&state, &authed).await?;
    let report = state.contents.bulk_import(&workspace, &body).await?;
    Ok(Json(report))
}
