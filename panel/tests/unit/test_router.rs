//! Control API routes driven through `oneshot`

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use hmac::{Hmac, Mac};
use repodeck::app::options::AppOptions;
use repodeck::app::state::AppState;
use repodeck::server::serve::router;
use repodeck::server::state::ServerState;
use repodeck::storage::layout::StorageLayout;
use repodeck::storage::settings::{Secrets, Settings};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::common::{git_server, FakeTransport, MASTER_SECRET};

const WEBHOOK_SECRET: &str = "hook-secret";

async fn app() -> (Router, Arc<AppState>, TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let options = AppOptions::from_settings(StorageLayout::new(tmp.path()), &Settings::default());
    let secrets = Secrets {
        master: SecretString::from(MASTER_SECRET.to_string()),
        webhook: Some(SecretString::from(WEBHOOK_SECRET.to_string())),
    };
    let state = AppState::init_with_transport(
        &options,
        secrets,
        Arc::new(FakeTransport::new(git_server)),
    )
    .await
    .unwrap();
    let state = Arc::new(state);
    (router(Arc::new(ServerState::new(&state))), state, tmp)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

async fn deliver(app: &Router, event: &str, body: &[u8], signature: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/github-webhook")
        .header("x-github-event", event)
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header("x-hub-signature-256", signature);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let (app, _, _tmp) = app().await;
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "repodeck");
}

#[tokio::test]
async fn test_deploy_conversation_over_http() {
    let (app, _, _tmp) = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/deploys",
        Some(json!({"user_id": 5, "owner": "acme", "repo": "site"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["kind"], "prompt");
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/deploys/{}/input", id),
        Some(json!({"input": {"type": "choose_method", "method": "archive"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "prompt");

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/deploys/{}/input", id),
        Some(json!({"input": {"type": "archive", "file_name": "a.zip", "content_base64": "%%%"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = call(&app, Method::DELETE, &format!("/deploys/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "cancelled");
    assert_eq!(body["terminal"], true);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/deploys/{}/input", id),
        Some(json!({"input": {"type": "change_path"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_repository_is_bad_request() {
    let (app, _, _tmp) = app().await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/deploys",
        Some(json!({"user_id": 5, "owner": "acme", "repo": "a b"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_repo_delete_needs_matching_confirmation() {
    let (app, _, _tmp) = app().await;

    let (status, body) = call(&app, Method::DELETE, "/users/5/repos/acme/site", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("type site"));

    let (status, _) = call(
        &app,
        Method::DELETE,
        "/users/5/repos/acme/site?confirm=Site",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_repo_rejects_bad_archive_up_front() {
    let (app, _, _tmp) = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/users/5/repos",
        Some(json!({
            "name": "new-site",
            "archive": {"file_name": "code.zip", "content_base64": "***"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("base64"));

    let (status, body) = call(
        &app,
        Method::POST,
        "/users/5/repos",
        Some(json!({
            "name": "new-site",
            "archive": {"file_name": "code.rar", "content_base64": "UEs="}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn test_server_profile_routes() {
    let (app, _, _tmp) = app().await;

    let (status, _) = call(&app, Method::GET, "/users/5/server", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/users/5/server",
        Some(json!({"host": "203.0.113.7", "username": "deploy", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, body) = call(
        &app,
        Method::PUT,
        "/users/5/server",
        Some(json!({"host": "203.0.113.7", "username": "deploy", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["port"], 22);
    assert_eq!(body["auth_kind"], "password");
    assert!(body.get("password").is_none());

    let (status, _) = call(&app, Method::DELETE, "/users/5/server", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::DELETE, "/users/5/server", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_toggles_require_account() {
    let (app, state, _tmp) = app().await;

    let (status, _) = call(&app, Method::POST, "/users/5/github/toggle-ignore-own", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state
        .accounts
        .link(5, "alice", "ciphertext".to_string())
        .await
        .unwrap();
    let (status, body) = call(&app, Method::POST, "/users/5/github/toggle-ignore-own", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignore_own_pushes"], true);

    let (_, body) = call(&app, Method::POST, "/users/5/github/toggle-repo-filter", None).await;
    assert_eq!(body["repo_filter"], "owner");
    let (_, body) = call(&app, Method::GET, "/users/5/github", None).await;
    assert_eq!(body["github_username"], "alice");
    assert_eq!(body["repo_filter"], "owner");
}

#[tokio::test]
async fn test_webhook_fans_out_signed_pushes() {
    let (app, state, _tmp) = app().await;
    state.subscriptions.subscribe(9, "acme/site").await.unwrap();

    let payload = json!({
        "repository": {"full_name": "Acme/Site", "html_url": "https://github.com/acme/site"},
        "pusher": {"name": "bob"},
        "commits": [{"message": "Fix header"}],
        "compare": "https://github.com/acme/site/compare/a...b"
    })
    .to_string();
    let body = payload.as_bytes();

    let (status, _) = deliver(&app, "push", body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = deliver(&app, "push", body, Some(sign(b"other body"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, ack) = deliver(&app, "push", body, Some(sign(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["delivered"], 1);

    let (status, ack) = deliver(&app, "ping", b"{}", Some(sign(b"{}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["delivered"], 0);

    let (_, inbox) = call(&app, Method::GET, "/users/9/notifications", None).await;
    let notifications = inbox["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0]["text"].as_str().unwrap().contains("Fix header"));

    let (_, inbox) = call(&app, Method::GET, "/users/9/notifications", None).await;
    assert!(inbox["notifications"].as_array().unwrap().is_empty());
}
