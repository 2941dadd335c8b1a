//! End-to-end search pipeline scenarios driven through the router.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use aaq_core::cache::QuotaCounter;
use support::{app, provision, send_json};
use test_utils::{build_context, StubChatModel, TestContextConfig};

async fn seeded_context(
    config: TestContextConfig,
) -> (test_utils::TestContext, String, String, i64, [i64; 3]) {
    let ctx = build_context(config);
    let (jwt, api_key, workspace_id) = provision(&ctx, "maternal-health").await;
    let workspace = ctx
        .identity
        .get_workspace(workspace_id)
        .await
        .unwrap()
        .unwrap();

    let c1 = ctx
        .seed_content(
            &workspace,
            "Headache during pregnancy",
            "Headache is common during pregnancy. Drink water and rest. \
             See a provider if the headache is severe.",
        )
        .await;
    let c2 = ctx
        .seed_content(
            &workspace,
            "Nutrition basics",
            "Eat a balanced diet with vegetables, fruit and protein.",
        )
        .await;
    let c3 = ctx
        .seed_content(
            &workspace,
            "Vaccination schedule",
            "Routine childhood vaccinations start at six weeks.",
        )
        .await;

    (ctx, jwt, api_key, workspace_id, [c1, c2, c3])
}

#[tokio::test]
async fn happy_retrieval_ranks_the_matching_content_first() {
    let (ctx, _jwt, api_key, _ws, [c1, _, _]) =
        seeded_context(TestContextConfig::default()).await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({
            "query_text": "I have a headache",
            "generate_llm_response": false
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_results"]["0"]["id"], json!(c1));
    let distance = body["search_results"]["0"]["distance"].as_f64().unwrap();
    assert!(distance < 0.5, "expected near match, got distance {distance}");
    assert!(body["query_id"].is_string());
    assert!(body["feedback_secret_key"].is_string());
    assert!(body.get("llm_response").is_none());
}

#[tokio::test]
async fn generation_path_returns_a_grounded_answer() {
    let (ctx, _jwt, api_key, _ws, _) = seeded_context(TestContextConfig::default()).await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({
            "query_text": "I have a headache",
            "generate_llm_response": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["llm_response"].as_str().unwrap().contains("[1]"));
    assert!(body["session_id"].is_string());
    assert_eq!(ctx.chat_model.generation_calls(), 1);
}

#[tokio::test]
async fn unsafe_query_is_blocked_without_a_generation_call() {
    let config = TestContextConfig {
        chat_model: StubChatModel {
            flag_unsafe_containing: vec!["harm".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    let (ctx, _jwt, api_key, ws, _) = seeded_context(config).await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({
            "query_text": "how do I harm someone",
            "generate_llm_response": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked_reason"], json!("unsafe"));
    assert!(body["search_results"].as_object().unwrap().is_empty());
    assert_eq!(ctx.chat_model.generation_calls(), 0);
    // The blocked query still produced a trace
    assert_eq!(ctx.store.trace_count(ws), 1);
}

#[tokio::test]
async fn quota_admits_exactly_the_configured_number_of_queries() {
    let (ctx, _jwt, api_key, ws, _) = seeded_context(TestContextConfig::default()).await;

    // Tighten the quota to 2 for this workspace
    use aaq_core::storage::IdentityStore;
    ctx.store
        .update_workspace_quotas(ws, None, Some(Some(2)))
        .await
        .unwrap();

    let app = app(&ctx);
    let request = json!({ "query_text": "I have a headache", "generate_llm_response": false });

    let (first, second, third) = tokio::join!(
        send_json(&app, Method::POST, "/search", Some(&api_key), Some(request.clone())),
        send_json(&app, Method::POST, "/search", Some(&api_key), Some(request.clone())),
        send_json(&app, Method::POST, "/search", Some(&api_key), Some(request.clone())),
    );

    let statuses = [first.0, second.0, third.0];
    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let throttled = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(ok, 2, "statuses: {statuses:?}");
    assert_eq!(throttled, 1, "statuses: {statuses:?}");
    assert_eq!(ctx.store.trace_count(ws), 2);
    assert_eq!(
        ctx.quota
            .current(ws, chrono::Utc::now().date_naive())
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn off_topic_query_returns_retrieval_only_results() {
    let config = TestContextConfig {
        paraphrase_threshold: 0.5,
        ..Default::default()
    };
    let (ctx, _jwt, api_key, _ws, _) = seeded_context(config).await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({
            "query_text": "quarterly revenue projections spreadsheet",
            "generate_llm_response": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("llm_response").is_none());
    let warnings: Vec<&str> = body["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_str().unwrap())
        .collect();
    assert!(warnings.contains(&"off_topic"));
    assert!(warnings.contains(&"unable_to_answer"));
    assert_eq!(ctx.chat_model.generation_calls(), 0);
}

#[tokio::test]
async fn llm_outage_blocks_generation_but_not_retrieval() {
    let (ctx, _jwt, api_key, _ws, [c1, _, _]) =
        seeded_context(TestContextConfig::default()).await;

    // Swap in a query service whose chat model is down
    let llm = std::sync::Arc::new(aaq_core::LlmService::new(
        std::sync::Arc::new(test_utils::FailingChatModel),
        2,
        0.1,
        128,
    ));
    let queries = std::sync::Arc::new(aaq_core::QueryService::new(
        aaq_core::RetrievalEngine::new(
            ctx.store.clone(),
            ctx.embeddings.clone(),
            aaq_core::config::RetrievalSettings {
                top_k: 4,
                similarity_floor: 0.0,
                exact_search_threshold: 512,
            },
        ),
        aaq_core::GuardrailChecks::new(
            llm.clone(),
            aaq_core::config::GuardrailSettings {
                allowed_languages: vec!["en".to_string()],
                paraphrase_threshold: 0.05,
                align_score_threshold: 0.7,
                safety_action: aaq_core::guardrails::SafetyAction::Block,
                step_timeout_secs: 1,
            },
        ),
        aaq_core::AnswerGenerator::new(llm),
        ctx.store.clone(),
        ctx.quota.clone(),
        aaq_core::SessionManager::new(
            std::sync::Arc::new(test_utils::InMemorySessionStore::new()),
            aaq_core::config::SessionSettings {
                ttl_secs: 1800,
                max_turns: 10,
                max_turn_chars: 4000,
            },
        ),
        4,
    ));
    let app = aaq_server::router(aaq_server::AppState {
        identity: ctx.identity.clone(),
        contents: ctx.contents.clone(),
        queries,
        feedback: ctx.feedback.clone(),
        urgency: ctx.urgency.clone(),
        dashboard: ctx.dashboard.clone(),
        topics: ctx.topics.clone(),
    });

    // Retrieval-only queries keep working through the outage
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_results"]["0"]["id"], json!(c1));

    // The generation path blocks conservatively: the safety classifier is
    // unreachable, so the query is rejected rather than passed unchecked
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({
            "query_text": "I have a headache",
            "generate_llm_response": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blocked_reason"], json!("unsafe"));
}

#[tokio::test]
async fn empty_workspace_returns_empty_results() {
    let ctx = build_context(TestContextConfig::default());
    let (_jwt, api_key, _ws) = provision(&ctx, "empty-workspace").await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "anything at all" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["search_results"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn k_larger_than_content_count_returns_all_rows() {
    let config = TestContextConfig {
        top_k: 10,
        ..Default::default()
    };
    let (ctx, _jwt, api_key, _ws, _) = seeded_context(config).await;
    let app = app(&ctx);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_results"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn content_retrieves_itself_at_rank_one() {
    let (ctx, _jwt, api_key, _ws, [c1, _, _]) =
        seeded_context(TestContextConfig::default()).await;
    let app = app(&ctx);

    let own_text = "Headache during pregnancy\nHeadache is common during pregnancy. \
                    Drink water and rest. See a provider if the headache is severe.";
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": own_text })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_results"]["0"]["id"], json!(c1));
    let distance = body["search_results"]["0"]["distance"].as_f64().unwrap();
    assert!(
        distance < f64::from(aaq_core::constants::SELF_RETRIEVAL_EPSILON),
        "self-retrieval distance {distance} above epsilon"
    );
}

#[tokio::test]
async fn search_requires_a_credential() {
    let (ctx, _jwt, _key, _ws, _) = seeded_context(TestContextConfig::default()).await;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/search",
        None,
        Some(json!({ "query_text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn archived_content_drops_out_of_retrieval() {
    let (ctx, jwt, api_key, ws, [c1, _, _]) =
        seeded_context(TestContextConfig::default()).await;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::PATCH,
        &format!("/content/{c1}"),
        Some(&jwt),
        Some(json!({ "is_archived": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;
    let results = body["search_results"].as_object().unwrap();
    assert!(results.values().all(|r| r["id"] != json!(c1)));

    // Unarchiving restores searchability; the embedding is reused
    let embedding_before = ctx.contents.get(ws, c1).await.unwrap().embedding;
    let (status, _) = send_json(
        &app,
        Method::PATCH,
        &format!("/content/{c1}"),
        Some(&jwt),
        Some(json!({ "is_archived": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&api_key),
        Some(json!({ "query_text": "I have a headache" })),
    )
    .await;
    assert_eq!(body["search_results"]["0"]["id"], json!(c1));
    assert_eq!(ctx.contents.get(ws, c1).await.unwrap().embedding, embedding_before);
}
