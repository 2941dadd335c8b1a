//! User, login, workspace and API-key scenarios.

mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use support::{app, provision, send_json};
use test_utils::{build_context, TestContextConfig};

#[tokio::test]
async fn register_login_and_query_current_user() {
    let ctx = build_context(TestContextConfig::default());
    let app = app(&ctx);

    let (status, created) = send_json(
        &app,
        Method::POST,
        "/user",
        None,
        Some(json!({ "username": "amina", "password": "strong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = created["user_id"].as_i64().unwrap();

    // Duplicate username conflicts
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/user",
        None,
        Some(json!({ "username": "amina", "password": "strong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // No workspace yet: login is forbidden
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "amina", "password": "strong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Give the user a workspace, then log in
    ctx.identity
        .create_workspace(
            user_id,
            aaq_core::model::NewWorkspace {
                name: "clinic".to_string(),
                content_quota: None,
                api_daily_quota: None,
            },
        )
        .await
        .unwrap();

    let (status, login) = send_json(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "amina", "password": "strong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["workspace_name"], json!("clinic"));
    assert_eq!(login["role"], json!("admin"));

    let token = login["access_token"].as_str().unwrap();
    let (status, me) = send_json(&app, Method::GET, "/user/current", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], json!("amina"));
    assert_eq!(me["workspaces"][0]["is_default"], json!(true));
}

#[tokio::test]
async fn wrong_password_is_unauthenticated() {
    let ctx = build_context(TestContextConfig::default());
    let _ = provision(&ctx, "clinic").await;
    let app = app(&ctx);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "clinic-admin", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rotating_the_api_key_invalidates_the_previous_one() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, key1, ws) = provision(&ctx, "rotating").await;
    let workspace = ctx.identity.get_workspace(ws).await.unwrap().unwrap();
    ctx.seed_content(&workspace, "Headache during pregnancy", "Headache headache advice.")
        .await;
    let app = app(&ctx);

    // key1 works
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&key1),
        Some(json!({ "query_text": "headache" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Rotate to key2
    let (status, rotated) =
        send_json(&app, Method::POST, "/workspace/rotate-key", Some(&jwt), None).await;
    assert_eq!(status, StatusCode::OK);
    let key2 = rotated["new_api_key"].as_str().unwrap().to_string();
    assert_ne!(key1, key2);

    // key1 is rejected, key2 accepted
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&key1),
        Some(json!({ "query_text": "headache" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(&key2),
        Some(json!({ "query_text": "headache" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn repeated_rotation_leaves_exactly_one_valid_key() {
    let ctx = build_context(TestContextConfig::default());
    let (jwt, key0, _ws) = provision(&ctx, "many-keys").await;
    let app = app(&ctx);

    let mut keys = vec![key0];
    for _ in 0..4 {
        let (_, rotated) =
            send_json(&app, Method::POST, "/workspace/rotate-key", Some(&jwt), None).await;
        keys.push(rotated["new_api_key"].as_str().unwrap().to_string());
    }

    let (valid, stale) = keys.split_last().unwrap();
    for key in stale {
        let (status, _) = send_json(
            &app,
            Method::POST,
            "/search",
            Some(key),
            Some(json!({ "query_text": "check" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "stale key accepted");
    }
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/search",
        Some(valid),
        Some(json!({ "query_text": "check" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn read_only_members_cannot_mutate_content() {
    let ctx = build_context(TestContextConfig::default());
    let (admin_id, workspace) = ctx.workspace_with_admin("shared").await;

    let reader = ctx
        .identity
        .register_user(&aaq_core::model::NewUser {
            username: "reader".to_string(),
            password: "reader-password".to_string(),
        })
        .await
        .unwrap();
    ctx.identity
        .add_user_to_workspace(
            admin_id,
            reader.id,
            workspace.id,
            aaq_core::model::UserRole::ReadOnly,
        )
        .await
        .unwrap();
    let reader_token = ctx
        .identity
        .login_workspace(reader.id, workspace.id)
        .await
        .unwrap()
        .token;

    let app = app(&ctx);
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/content",
        Some(&reader_token),
        Some(json!({ "title": "New", "text": "Body" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reading is fine
    let (status, _) = send_json(&app, Method::GET, "/content", Some(&reader_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn switching_workspaces_rebinds_the_token() {
    let ctx = build_context(TestContextConfig::default());
    let (user_id, first) = ctx.workspace_with_admin("first-ws").await;
    let second = ctx
        .identity
        .create_workspace(
            user_id,
            aaq_core::model::NewWorkspace {
                name: "second-ws".to_string(),
                content_quota: None,
                api_daily_quota: None,
            },
        )
        .await
        .unwrap();
    let token = ctx
        .identity
        .login_workspace(user_id, first.id)
        .await
        .unwrap()
        .token;

    let app = app(&ctx);
    let (status, switched) = send_json(
        &app,
        Method::POST,
        "/workspace/switch",
        Some(&token),
        Some(json!({ "workspace_id": second.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(switched["workspace_id"], json!(second.id));

    // A workspace the user does not belong to is forbidden
    let stranger = ctx.workspace_with_admin("stranger-ws").await.1;
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/workspace/switch",
        Some(&token),
        Some(json!({ "workspace_id": stranger.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
