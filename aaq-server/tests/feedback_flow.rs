//! Feedback capability-key scenarios.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use support::{app, provision, send_json};
use test_utils::{build_context, TestContextConfig};

async fn run_search(
    app: &axum::Router,
    api_key: &str,
) -> (Uuid, String, i64) {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/search",
        Some(api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let query_id: Uuid = body["query_id"].as_str().unwrap().parse().unwrap();
    let secret = body["feedback_secret_key"].as_str().unwrap().to_string();
    let content_id = body["search_results"]["0"]["id"].as_i64().unwrap();
    (query_id, secret, content_id)
}

fn context() -> test_utils::TestContext {
    build_context(TestContextConfig::default())
}

#[tokio::test]
async fn matching_secret_key_authorizes_feedback() {
    let ctx = context();
    let (_jwt, api_key, ws) = provision(&ctx, "feedback-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);
    let (query_id, secret, _) = run_search(&app, &api_key).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/response-feedback",
        None,
        Some(json!({
            "query_id": query_id,
            "feedback_secret_key": secret,
            "feedback_sentiment": "positive",
            "feedback_text": "helpful"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("recorded"));
}

#[tokio::test]
async fn wrong_secret_key_is_forbidden() {
    let ctx = context();
    let (_jwt, api_key, ws) = provision(&ctx, "feedback-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);
    let (query_id, _secret, _) = run_search(&app, &api_key).await;

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/response-feedback",
        None,
        Some(json!({
            "query_id": query_id,
            "feedback_secret_key": "definitely-not-the-right-key-12345",
            "feedback_sentiment": "positive"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_positive_feedback_is_idempotent() {
    let ctx = context();
    let (_jwt, api_key, ws) = provision(&ctx, "feedback-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);
    let (query_id, secret, _) = run_search(&app, &api_key).await;

    let body = json!({
        "query_id": query_id,
        "feedback_secret_key": secret.clone(),
        "feedback_sentiment": "positive"
    });
    let (first_status, first) =
        send_json(&app, Method::POST, "/response-feedback", None, Some(body.clone())).await;
    let (second_status, second) =
        send_json(&app, Method::POST, "/response-feedback", None, Some(body)).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["status"], json!("recorded"));
    assert_eq!(second["status"], json!("duplicate_ignored"));
    assert_eq!(ctx.store.response_feedback_rows(query_id).len(), 1);

    // The opposite sentiment is a second row, not a duplicate
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/response-feedback",
        None,
        Some(json!({
            "query_id": query_id,
            "feedback_secret_key": secret,
            "feedback_sentiment": "negative"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("recorded"));
    assert_eq!(ctx.store.response_feedback_rows(query_id).len(), 2);
}

#[tokio::test]
async fn workspace_credential_also_authorizes_feedback() {
    let ctx = context();
    let (_jwt, api_key, ws) = provision(&ctx, "feedback-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);
    let (query_id, _secret, content_id) = run_search(&app, &api_key).await;

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content-feedback",
        Some(&api_key),
        Some(json!({
            "query_id": query_id,
            "content_id": content_id,
            "feedback_sentiment": "positive"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Vote counter moved on first insert
    let content = ctx.contents.get(ws, content_id).await.unwrap();
    assert_eq!(content.positive_votes, 1);

    // A content id the query never retrieved is rejected
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content-feedback",
        Some(&api_key),
        Some(json!({
            "query_id": query_id,
            "content_id": 999_999,
            "feedback_sentiment": "positive"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
