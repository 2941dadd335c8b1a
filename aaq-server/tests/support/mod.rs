//! Shared helpers for router-level tests: wire the in-memory context into
//! the real router and drive it with `oneshot`.

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use aaq_server::{router, AppState};
use test_utils::TestContext;

/// Build the application router over a test context
pub fn app(ctx: &TestContext) -> Router {
    router(AppState {
        identity: ctx.identity.clone(),
        contents: ctx.contents.clone(),
        queries: ctx.queries.clone(),
        feedback: ctx.feedback.clone(),
        urgency: ctx.urgency.clone(),
        dashboard: ctx.dashboard.clone(),
        topics: ctx.topics.clone(),
    })
}

/// One JSON request through the router
pub async fn send_json(
    app: &Router,
    method: Method,
    path: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    split(response).await
}

/// Raw-body POST (CSV upload)
pub async fn send_bytes(
    app: &Router,
    path: &str,
    bearer: &str,
    body: Vec<u8>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .header(header::CONTENT_TYPE, "text/csv")
        .body(Body::from(body))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    split(response).await
}

async fn split(response: Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Register a user + workspace, rotate an API key and mint a JWT.
/// Returns `(jwt, api_key, workspace_id)`.
pub async fn provision(ctx: &TestContext, name: &str) -> (String, String, i64) {
    let (user_id, workspace) = ctx.workspace_with_admin(name).await;
    let api_key = ctx
        .identity
        .rotate_api_key(user_id, workspace.id)
        .await
        .expect("rotate key");
    let jwt = ctx
        .identity
        .login_workspace(user_id, workspace.id)
        .await
        .expect("login")
        .token;
    (jwt, api_key, workspace.id)
}
