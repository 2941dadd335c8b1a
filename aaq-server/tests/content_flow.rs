//! Content CRUD, tags, quotas and CSV import scenarios.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::{app, provision, send_bytes, send_json};
use test_utils::{build_context, TestContextConfig};

#[tokio::test]
async fn content_crud_round_trip() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, _key, _ws) = provision(&ctx, "crud-ws").await;
    let app = app(&ctx);

    let (status, tag) = send_json(
        &app,
        Method::POST,
        "/tag",
        Some(&jwt),
        Some(json!({ "name": "pregnancy" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tag_id = tag["id"].as_i64().unwrap();

    let (status, created) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({
            "title": "Headache during pregnancy",
            "text": "Rest and hydration help.",
            "tag_ids": [tag_id]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let content_id = created["id"].as_i64().unwrap();
    assert!(created.get("embedding").is_none());

    // Duplicate title conflicts
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({
            "title": "Headache during pregnancy",
            "text": "Different body."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Metadata-only update keeps the embedding untouched
    let before = ctx
        .contents
        .get(created["workspace_id"].as_i64().unwrap(), content_id)
        .await
        .unwrap()
        .embedding;
    let (status, _) = send_json(
        &app,
        Method::PUT,
        &format!("/content/{content_id}"),
        Some(&jwt),
        Some(json!({ "metadata": { "reviewed": true } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let after = ctx
        .contents
        .get(created["workspace_id"].as_i64().unwrap(), content_id)
        .await
        .unwrap()
        .embedding;
    assert_eq!(before, after);

    // Text change recomputes the embedding
    let (status, _) = send_json(
        &app,
        Method::PUT,
        &format!("/content/{content_id}"),
        Some(&jwt),
        Some(json!({ "text": "Completely different advice about sleep." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let recomputed = ctx
        .contents
        .get(created["workspace_id"].as_i64().unwrap(), content_id)
        .await
        .unwrap()
        .embedding;
    assert_ne!(after, recomputed);

    // Listing filters by search text
    let (status, listed) = send_json(
        &app,
        Method::GET,
        "/content?search_text=sleep",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Unknown tag id is rejected
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({
            "title": "Another",
            "text": "Body.",
            "tag_ids": [999]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_quota_limits_live_rows() {
    let ctx = build_context(TestContextConfig::default());
    let (user_id, workspace) = ctx.workspace_with_admin("tight-quota").await;
    ctx.identity
        .update_workspace_quotas(user_id, workspace.id, Some(Some(1)), None)
        .await
        .unwrap();
    let jwt = ctx
        .identity
        .login_workspace(user_id, workspace.id)
        .await
        .unwrap()
        .token;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({ "title": "First", "text": "Body one." })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({ "title": "Second", "text": "Body two." })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn csv_upload_reports_partial_success() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, _key, ws) = provision(&ctx, "import-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Existing title", "Existing body.").await;
    let app = app(&ctx);

    let csv = "title,text\n\
               Fresh row,Completely new content.\n\
               Existing title,Clashes with stored content.\n\
               ,Missing the title.\n\
               Fresh row,Duplicate inside the upload.\n";

    let (status, report) =
        send_bytes(&app, "/content/csv-upload", &jwt, csv.as_bytes().to_vec()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["imported"], json!(1));

    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 3);
    let types: Vec<&str> = errors.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert!(types.contains(&"title_exists"));
    assert!(types.contains(&"invalid_title"));
    assert!(types.contains(&"duplicate_title"));
}

#[tokio::test]
async fn oversize_fields_are_rejected() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, _key, _ws) = provision(&ctx, "limits-ws").await;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({ "title": "x".repeat(151), "text": "fine" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&jwt),
        Some(json!({ "title": "fine", "text": "x".repeat(2001) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
