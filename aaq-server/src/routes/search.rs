//! The `/search` handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use aaq_core::model::RetrievedItem;
use aaq_core::SearchRequest;

use crate::auth::WorkspaceAuth;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query_text: String,
    #[serde(default)]
    pub generate_llm_response: bool,
    #[serde(default)]
    pub query_metadata: Value,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query_id: Uuid,
    /// Rank → result, keyed `"0"`, `"1"`, ...
    pub search_results: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<String>,
    pub feedback_secret_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn keyed_results(results: &[RetrievedItem]) -> serde_json::Map<String, Value> {
    results
        .iter()
        .enumerate()
        .filter_map(|(rank, item)| {
            serde_json::to_value(item)
                .ok()
                .map(|value| (rank.to_string(), value))
        })
        .collect()
}

pub async fn search(
    State(state): State<AppState>,
    auth: WorkspaceAuth,
    Json(body): Json<SearchBody>,
) -> ApiResult<Json<SearchResponse>> {
    let outcome = state
        .queries
        .handle_search(
            &auth.workspace,
            SearchRequest {
                query_text: body.query_text,
                generate_llm_response: body.generate_llm_response,
                query_metadata: body.query_metadata,
                session_id: body.session_id,
            },
        )
        .await?;

    Ok(Json(SearchResponse {
        query_id: outcome.query_id,
        search_results: keyed_results(&outcome.results),
        llm_response: outcome.llm_response,
        feedback_secret_key: outcome.feedback_secret_key,
        session_id: outcome.session_id,
        blocked_reason: outcome.blocked_reason.map(ToString::to_string),
        warnings: outcome.warnings,
    }))
}
