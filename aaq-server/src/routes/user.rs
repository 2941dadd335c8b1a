//! User registration, profile and login handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aaq_core::model::NewUser;
use aaq_core::Error;

use crate::auth::AuthedUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceMembership {
    pub workspace_id: i64,
    pub workspace_name: String,
    pub role: String,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user_id: i64,
    pub username: String,
    pub workspaces: Vec<WorkspaceMembership>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.identity.register_user(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user_id: user.id,
            username: user.username,
            created_at: user.created_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .identity
        .update_user(
            authed.user_id,
            user_id,
            payload.username.as_deref(),
            payload.password.as_deref(),
        )
        .await?;
    Ok(Json(UserResponse {
        user_id: user.id,
        username: user.username,
        created_at: user.created_at,
    }))
}

pub async fn current_user(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<Json<CurrentUserResponse>> {
    let user = state
        .identity
        .get_user(authed.user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("user {}", authed.user_id)))?;

    let workspaces = state
        .identity
        .workspaces_for_user(user.id)
        .await?
        .into_iter()
        .map(|(workspace, link)| WorkspaceMembership {
            workspace_id: workspace.id,
            workspace_name: workspace.name,
            role: link.role.to_string(),
            is_default: link.is_default,
        })
        .collect();

    Ok(Json(CurrentUserResponse {
        user_id: user.id,
        username: user.username,
        workspaces,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: i64,
    pub workspace_id: i64,
    pub workspace_name: String,
    pub role: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .identity
        .login(&payload.username, &payload.password)
        .await?;
    Ok(Json(LoginResponse {
        access_token: outcome.token,
        token_type: "bearer",
        user_id: outcome.user.id,
        workspace_id: outcome.workspace.id,
        workspace_name: outcome.workspace.name,
        role: outcome.role.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginWorkspaceRequest {
    pub workspace_id: i64,
}

/// Issue a fresh token bound to another workspace the user belongs to
pub async fn login_workspace(
    State(state): State<AppState>,
    authed: AuthedUser,
    Json(payload): Json<LoginWorkspaceRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .identity
        .login_workspace(authed.user_id, payload.workspace_id)
        .await?;
    Ok(Json(LoginResponse {
        access_token: outcome.token,
        token_type: "bearer",
        user_id: outcome.user.id,
        workspace_id: outcome.workspace.id,
        workspace_name: outcome.workspace.name,
        role: outcome.role.to_string(),
    }))
}
