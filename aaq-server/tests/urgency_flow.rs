//! Urgency detection scenarios.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::{app, provision, send_json};
use test_utils::{build_context, StubChatModel, TestContextConfig};

#[tokio::test]
async fn rule_match_flags_the_query_and_orders_matches() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, api_key, _ws) = provision(&ctx, "urgency-ws").await;
    let app = app(&ctx);

    for rule in ["bleeding", "can't breathe"] {
        let (status, _) = send_json(
            &app,
            Method::POST,
            "/urgency-rules",
            Some(&jwt),
            Some(json!({ "text": rule })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/urgency-detect",
        Some(&api_key),
        Some(json!({ "query_text": "my baby is bleeding" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_urgent"], json!(true));
    let matches = body["matched_rules"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["text"], json!("bleeding"));

    let similarities: Vec<f64> = matches
        .iter()
        .map(|m| m["similarity"].as_f64().unwrap())
        .collect();
    let mut sorted = similarities.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(similarities, sorted);
}

#[tokio::test]
async fn unrelated_query_is_not_urgent() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, api_key, _ws) = provision(&ctx, "urgency-ws").await;
    let app = app(&ctx);

    let (_, _) = send_json(
        &app,
        Method::POST,
        "/urgency-rules",
        Some(&jwt),
        Some(json!({ "text": "bleeding" })),
    )
    .await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/urgency-detect",
        Some(&api_key),
        Some(json!({ "query_text": "what vegetables are good for toddlers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_urgent"], json!(false));
    assert!(body["matched_rules"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn llm_strategy_is_used_when_no_rules_exist() {
    let ctx = build_context(TestContextConfig {
        chat_model: StubChatModel {
            is_urgent: true,
            ..Default::default()
        },
        ..Default::default()
    });
    let (_jwt, api_key, _ws) = provision(&ctx, "llm-urgency").await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/urgency-detect",
        Some(&api_key),
        Some(json!({ "query_text": "severe chest pain" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_urgent"], json!(true));
    assert!(body["matched_rules"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn llm_failure_defaults_to_not_urgent_with_reason() {
    let ctx = build_context(TestContextConfig::default());
    let (_jwt, _api_key, ws) = provision(&ctx, "failing-llm").await;

    // No rules configured, so detection goes through a dead chat model
    let llm = std::sync::Arc::new(aaq_core::LlmService::new(
        std::sync::Arc::new(test_utils::FailingChatModel),
        2,
        0.1,
        128,
    ));
    let detector = aaq_core::UrgencyDetector::new(
        ctx.store.clone(),
        ctx.embeddings.clone(),
        llm,
        0.6,
    );

    let trace = detector.detect(ws, "is this urgent").await.unwrap();
    assert!(!trace.is_urgent);
    assert!(trace.failure_reason.is_some());
}
