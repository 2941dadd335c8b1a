//! Urgency-detection handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use aaq_core::model::{MatchedRule, UrgencyRule};

use crate::auth::{AuthedUser, WorkspaceAuth};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub query_text: String,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub is_urgent: bool,
    pub matched_rules: Vec<MatchedRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

pub async fn detect(
    State(state): State<AppState>,
    auth: WorkspaceAuth,
    Json(body): Json<DetectRequest>,
) -> ApiResult<Json<DetectResponse>> {
    let trace = state
        .urgency
        .detect(auth.workspace.id, &body.query_text)
        .await?;
    Ok(Json(DetectResponse {
        is_urgent: trace.is_urgent,
        matched_rules: trace.matched_rules,
        failure_reason: trace.failure_reason,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub text: String,
}

pub async fn create_rule(
    State(state): State<AppState>,
    authed: AuthedUser,
    Json(body): Json<CreateRuleRequest>,
) -> ApiResult<(StatusCode, Json<UrgencyRule>)> {
    authed.require_admin()?;
    let rule = state
        .urgency
        .create_rule(authed.workspace_id, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_rules(
    State(state): State<AppState>,
    authed: AuthedUser,
) -> ApiResult<Json<Vec<UrgencyRule>>> {
    let rules = state.urgency.list_rules(authed.workspace_id).await?;
    Ok(Json(rules))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    authed: AuthedUser,
    Path(rule_id): Path<i64>,
) -> ApiResult<StatusCode> {
    authed.require_admin()?;
    state.urgency.delete_rule(authed.workspace_id, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
