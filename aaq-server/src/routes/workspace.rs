//! Workspace management handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};

use aaq_core::model::{NewWorkspace, UserRole, Workspace};

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub workspace_id: i64,
    pub workspace_name: String,
    pub content_quota: Option<i64>,
    pub api_daily_quota: Option<i64>,
    pub api_key_first_characters: Option<String>,
}

impl From<Workspace> for WorkspaceResponse {
    fn from(workspace: Workspace) -> Self {
        Self {
            workspace_id: workspace.id,
            workspace_name: workspace.name,
            content_quota: workspace.content_quota,
            api_daily_quota: workspace.api_daily_quota,
            api_key_first_characters: workspace.api_key_first_characters,
        }
    }
}

pub async fn create_workspace(
    State(state): State<AppState>,
    authed: AuthedUser,
    Json(payload): Json<NewWorkspace>,
) -> ApiResult<(StatusCode, Json<WorkspaceResponse>)> {
    let workspace = state
        .identity
        .create_workspace(authed.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(workspace.into())))
}

/// Distinguishes an absent field (keep) from an explicit `null` (unset)
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateWorkspaceRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub content_quota: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub api_daily_quota: Option<Option<i64>>,
}

pub async fn update_workspace(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(workspace_id): Path<i64>,
    Json(payload): Json<UpdateWorkspaceRequest>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let workspace = state
        .identity
        .update_workspace_quotas(
            authed.user_id,
            workspace_id,
            payload.content_quota,
            payload.api_daily_quota,
        )
        .await?;
    Ok(Json(workspace.into()))
}

#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    /// Plaintext key; shown exactly once
    pub new_api_key: String,
}

pub async fn rotate_api_key(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<Json<RotateKeyResponse>> {
    let new_api_key = state
        .identity
        .rotate_api_key(authed.user_id, authed.workspace_id)
        .await?;
    Ok(Json(RotateKeyResponse { new_api_key }))
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub user_id: i64,
    pub role: UserRole,
}

pub async fn add_user(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(workspace_id): Path<i64>,
    Json(payload): Json<AddUserRequest>,
) -> ApiResult<StatusCode> {
    state
        .identity
        .add_user_to_workspace(authed.user_id, payload.user_id, workspace_id, payload.role)
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn set_default(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(workspace_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .identity
        .set_default_workspace(authed.user_id, workspace_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
