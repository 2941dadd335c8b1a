//! Tag handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use aaq_core::model::Tag;

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub async fn create_tag(
    State(state): State<AppState>,
    authed: AuthedUser,
    Json(payload): Json<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    authed.require_admin()?;
    let tag = state
        .contents
        .create_tag(authed.workspace_id, &payload.name)
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn list_tags(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<Json<Vec<Tag>>> {
    let tags = state.contents.list_tags(authed.workspace_id).await?;
    Ok(Json(tags))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(tag_id): Path<i64>,
) -> ApiResult<StatusCode> {
    authed.require_admin()?;
    state.contents.delete_tag(authed.workspace_id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
