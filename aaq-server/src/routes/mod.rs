//! Route assembly.

pub mod content;
pub mod dashboard;
pub mod feedback;
pub mod search;
pub mod tag;
pub mod urgency;
pub mod user;
pub mod workspace;

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        // Users and sessions
        .route("/user", post(user::create_user))
        .route("/user/current", get(user::current_user))
        .route("/user/{user_id}", put(user::update_user))
        .route("/login", post(user::login))
        .route("/login-workspace", post(user::login_workspace))
        // Workspaces
        .route("/workspace", post(workspace::create_workspace))
        .route("/workspace/{workspace_id}", put(workspace::update_workspace))
        .route("/workspace/switch", post(user::login_workspace))
        .route("/workspace/rotate-key", post(workspace::rotate_api_key))
        .route("/workspace/{workspace_id}/users", post(workspace::add_user))
        .route(
            "/workspace/{workspace_id}/set-default",
            post(workspace::set_default),
        )
        // Content and tags
        .route("/content", post(content::create_content).get(content::list_content))
        .route(
            "/content/{content_id}",
            get(content::get_content)
                .put(content::update_content)
                .patch(content::set_archived)
                .delete(content::delete_content),
        )
        .route("/content/csv-upload", post(content::csv_upload))
        .route("/tag", post(tag::create_tag).get(tag::list_tags))
        .route("/tag/{tag_id}", delete(tag::delete_tag))
        // Query pipeline
        .route("/search", post(search::search))
        .route("/response-feedback", post(feedback::response_feedback))
        .route("/content-feedback", post(feedback::content_feedback))
        // Urgency detection
        .route("/urgency-detect", post(urgency::detect))
        .route(
            "/urgency-rules",
            post(urgency::create_rule).get(urgency::list_rules),
        )
        .route("/urgency-rules/{rule_id}", delete(urgency::delete_rule))
        // Dashboard
        .route("/dashboard/overview", get(dashboard::overview))
        .route("/dashboard/performance", get(dashboard::performance))
        .route("/dashboard/insights", get(dashboard::insights))
        .route("/dashboard/insights/refresh", post(dashboard::refresh_insights))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
