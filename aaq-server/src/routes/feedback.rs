//! Feedback handlers.
//!
//! Authorization is capability-style: either the per-trace
//! `feedback_secret_key` or a workspace credential (API key / session token)
//! authorizes a submission.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use aaq_core::model::FeedbackSentiment;
use aaq_core::{Error, FeedbackAuth};

use crate::auth::MaybeWorkspaceAuth;
use crate::error::ApiResult;
use crate::state::AppState;

fn resolve_auth(
    secret_key: Option<String>,
    workspace: &MaybeWorkspaceAuth,
) -> Result<FeedbackAuth, Error> {
    if let Some(key) = secret_key {
        return Ok(FeedbackAuth::SecretKey(key));
    }
    if let Some(auth) = &workspace.0 {
        return Ok(FeedbackAuth::Workspace(auth.workspace.id));
    }
    Err(Error::Unauthenticated(
        "provide a feedback secret key or a workspace credential".to_string(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResponseFeedbackBody {
    pub query_id: Uuid,
    pub feedback_secret_key: Option<String>,
    pub feedback_sentiment: FeedbackSentiment,
    pub feedback_text: Option<String>,
}

pub async fn response_feedback(
    State(state): State<AppState>,
    workspace: MaybeWorkspaceAuth,
    Json(body): Json<ResponseFeedbackBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let auth = resolve_auth(body.feedback_secret_key, &workspace)?;
    let stored = state
        .feedback
        .record_response_feedback(body.query_id, &auth, body.feedback_sentiment, body.feedback_text)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": if stored { "recorded" } else { "duplicate_ignored" }
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ContentFeedbackBody {
    pub query_id: Uuid,
    pub content_id: i64,
    pub feedback_secret_key: Option<String>,
    pub feedback_sentiment: FeedbackSentiment,
    pub feedback_text: Option<String>,
}

pub async fn content_feedback(
    State(state): State<AppState>,
    workspace: MaybeWorkspaceAuth,
    Json(body): Json<ContentFeedbackBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let auth = resolve_auth(body.feedback_secret_key, &workspace)?;
    let stored = state
        .feedback
        .record_content_feedback(
            body.query_id,
            body.content_id,
            &auth,
            body.feedback_sentiment,
            body.feedback_text,
        )
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": if stored { "recorded" } else { "duplicate_ignored" }
        })),
    ))
}
