//! Dashboard aggregate scenarios.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::{app, provision, send_json};
use test_utils::{build_context, TestContextConfig};

#[tokio::test]
async fn overview_counts_queries_and_feedback() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, api_key, ws) = provision(&ctx, "dash-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);

    // Two queries, one upvote
    let (_, first) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;
    send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "headache remedies" })),
    )
    .await;
    send_json(
        &app,
        Method::POST,
        "/response-feedback",
        None,
        Some(json!({
            "query_id": first["query_id"],
            "feedback_secret_key": first["feedback_secret_key"],
            "feedback_sentiment": "positive"
        })),
    )
    .await;

    let (status, body) = send_json(
        &app,
        Method::GET,
        "/dashboard/overview?period=day",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats_cards"]["queries"]["value"], json!(2));
    assert_eq!(body["stats_cards"]["upvotes"]["value"], json!(1));
    assert_eq!(body["stats_cards"]["downvotes"]["value"], json!(0));

    let buckets = body["time_series"].as_array().unwrap();
    let total: i64 = buckets.iter().map(|b| b["count"].as_i64().unwrap()).sum();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn performance_lists_top_content() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, api_key, ws) = provision(&ctx, "perf-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    let c1 = ctx
        .seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    ctx.seed_content(&workspace, "Nutrition basics", "Vegetables and protein.")
        .await;
    let app = app(&ctx);

    for _ in 0..3 {
        send_json(
            &app,
            Method::POST,
            "/search",
            Some(&api_key),
            Some(json!({ "query_text": "I have a headache" })),
        )
        .await;
    }

    let (status, body) = send_json(
        &app,
        Method::GET,
        "/dashboard/performance?period=day",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let top = body["top_content"].as_array().unwrap();
    assert!(!top.is_empty());
    assert_eq!(top[0]["content_id"], json!(c1));
    assert_eq!(top[0]["query_count"], json!(3));
}

#[tokio::test]
async fn hourly_frequency_is_rejected_for_wide_spans() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, _key, _ws) = provision(&ctx, "freq-ws").await;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/dashboard/overview?period=custom\
         &start_date=2026-01-01T00:00:00Z&end_date=2026-02-01T00:00:00Z&frequency=hour",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &app,
        Method::GET,
        "/dashboard/overview?period=custom\
         &start_date=2026-01-01T00:00:00Z&end_date=2026-02-01T00:00:00Z&frequency=day",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn insights_start_empty_and_refresh_coalesces() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, api_key, ws) = provision(&ctx, "topics-ws").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);

    let (status, body) =
        send_json(&app, Method::GET, "/dashboard/insights", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("not_started"));

    // Enough similar queries to form one cluster
    for i in 0..4 {
        send_json(
            &app,
            Method::POST,
            "/search",
            Some(&api_key),
            Some(json!({ "query_text": format!("headache advice number {i}") })),
        )
        .await;
    }

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/dashboard/insights/refresh",
        Some(&jwt),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["detail"], json!("refresh started"));

    // Poll until the background job completes
    let mut completed = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (_, body) =
            send_json(&app, Method::GET, "/dashboard/insights", Some(&jwt), None).await;
        if body["status"] == json!("completed") {
            completed = true;
            assert!(body["refresh_timestamp"].is_string());
            break;
        }
    }
    assert!(completed, "topic refresh never completed");
}
