//! GitHub client and response cache against a local fake API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use std::sync::Mutex;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use github_api::models::{Contents, CreateRepoRequest, RepoPatch};
use repodeck::cache::response::ResponseCache;
use repodeck::errors::PanelError;
use repodeck::github::client::{file_text, MAX_ZIPBALL_BYTES};
use repodeck::filesys::file::File;
use repodeck::github::{FileEdit, GithubClient, GithubService, HookStatus, NewRepo, RepoContents};
use repodeck::storage::accounts::AccountStore;
use repodeck::storage::subscriptions::SubscriptionStore;
use repodeck::storage::accounts::RepoFilter;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Default)]
struct Hits {
    repos: AtomicUsize,
    deletes: AtomicUsize,
    /// JSON bodies of write requests, in arrival order
    bodies: Mutex<Vec<Value>>,
}

impl Hits {
    fn record(&self, body: Value) {
        self.bodies.lock().unwrap().push(body);
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap()
    }
}

fn repo_json(name: &str) -> Value {
    json!({
        "name": name,
        "full_name": format!("acme/{}", name),
        "owner": {"login": "acme"},
        "html_url": format!("https://github.com/acme/{}", name),
        "description": null,
        "private": false,
        "default_branch": "main"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer good-token")
        .unwrap_or(false)
}

async fn fake_github() -> (String, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route(
            "/user",
            get(|headers: HeaderMap| async move {
                if authorized(&headers) {
                    Ok(Json(json!({"login": "alice", "id": 1, "name": null})))
                } else {
                    Err(StatusCode::UNAUTHORIZED)
                }
            }),
        )
        .route(
            "/user/repos",
            get(
                |State(hits): State<Arc<Hits>>, Query(q): Query<HashMap<String, String>>| async move {
                    hits.repos.fetch_add(1, Ordering::SeqCst);
                    let per_page: usize = q.get("per_page").and_then(|v| v.parse().ok()).unwrap_or(30);
                    let names = ["site", "blog", "docs"];
                    let repos: Vec<Value> =
                        names.iter().take(per_page).map(|n| repo_json(n)).collect();
                    Json(Value::Array(repos))
                },
            ),
        )
        .route("/repos/acme/site", get(|| async { Json(repo_json("site")) }))
        .route(
            "/repos/acme/site/branches/main",
            get(|| async { Json(json!({"name": "main", "commit": {"sha": "abc123"}})) }),
        )
        .route(
            "/repos/acme/site/hooks",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "message": "Validation Failed",
                        "errors": [{"message": "Hook already exists on this repository"}]
                    })),
                )
            }),
        )
        .route(
            "/user/repos",
            post(
                |State(hits): State<Arc<Hits>>, Json(body): Json<Value>| async move {
                    hits.record(body.clone());
                    let name = body["name"].as_str().unwrap_or_default().to_string();
                    if name == "taken" {
                        return (
                            StatusCode::UNPROCESSABLE_ENTITY,
                            Json(json!({
                                "message": "Repository creation failed.",
                                "errors": [{"message": "name already exists on this account"}]
                            })),
                        );
                    }
                    (StatusCode::CREATED, Json(repo_json(&name)))
                },
            ),
        )
        .route(
            "/repos/acme/site",
            patch(
                |State(hits): State<Arc<Hits>>, Json(body): Json<Value>| async move {
                    hits.record(body.clone());
                    let mut repo = repo_json(body["name"].as_str().unwrap_or("site"));
                    repo["description"] = body["description"].clone();
                    Json(repo)
                },
            )
            .delete(|State(hits): State<Arc<Hits>>| async move {
                hits.deletes.fetch_add(1, Ordering::SeqCst);
                StatusCode::NO_CONTENT
            }),
        )
        .route(
            "/repos/acme/site/contents",
            get(|| async {
                Json(json!([
                    {"type": "file", "name": "README.md", "path": "README.md", "sha": "b10b", "size": 6},
                    {"type": "dir", "name": "src", "path": "src", "sha": "d1r", "size": 0}
                ]))
            }),
        )
        .route(
            "/repos/acme/site/contents/{*path}",
            get(|Path(path): Path<String>| async move {
                match path.as_str() {
                    "README.md" => Ok(Json(json!({
                        "type": "file", "name": "README.md", "path": "README.md",
                        "sha": "b10b", "size": 6,
                        "content": "aGVs\nbG8K\n", "encoding": "base64"
                    }))),
                    _ => Err(StatusCode::NOT_FOUND),
                }
            })
            .put(
                |State(hits): State<Arc<Hits>>, Json(body): Json<Value>| async move {
                    hits.record(body.clone());
                    if body["sha"] == "stale" {
                        return (
                            StatusCode::CONFLICT,
                            Json(json!({"message": "README.md does not match b10b"})),
                        );
                    }
                    (StatusCode::OK, Json(json!({"commit": {"sha": "c0ffee"}})))
                },
            ),
        )
        .route(
            "/repos/acme/site/zipball",
            get(|| async { b"PK\x03\x04 zipball".to_vec() }),
        )
        .route("/repos/acme/empty/zipball", get(|| async { Vec::<u8>::new() }))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

fn token(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

#[tokio::test]
async fn test_repo_listing_is_cached_per_token() {
    let (base, hits) = fake_github().await;
    let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 16));
    let client = GithubClient::new(&base, cache.clone()).unwrap();

    let page = client
        .list_repos(&token("good-token"), 1, 2, RepoFilter::All)
        .await
        .unwrap();
    assert_eq!(page.repos.len(), 2);
    assert!(page.has_next);

    client
        .list_repos(&token("good-token"), 1, 2, RepoFilter::All)
        .await
        .unwrap();
    assert_eq!(hits.repos.load(Ordering::SeqCst), 1);

    // another filter is another cache entry
    let owned = client
        .list_repos(&token("good-token"), 1, 10, RepoFilter::Owner)
        .await
        .unwrap();
    assert_eq!(owned.repos.len(), 3);
    assert!(!owned.has_next);
    assert_eq!(hits.repos.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_user_and_branch_head() {
    let (base, _) = fake_github().await;
    let client =
        GithubClient::new(&base, Arc::new(ResponseCache::new(Duration::from_secs(60), 16)))
            .unwrap();

    let user = client.get_user(&token("good-token")).await.unwrap();
    assert_eq!(user.login, "alice");

    let err = client.get_user(&token("bad-token")).await.unwrap_err();
    assert!(matches!(err, PanelError::ValidationError(_)));

    let head = client
        .default_branch_head(&token("good-token"), "acme", "site")
        .await
        .unwrap();
    assert_eq!(head.branch, "main");
    assert_eq!(head.sha, "abc123");

    let missing = client
        .get_repo(&token("good-token"), "acme", "nope")
        .await
        .unwrap_err();
    assert!(matches!(missing, PanelError::NotFound(_)));
}

#[tokio::test]
async fn test_existing_hook_counts_as_success() {
    let (base, _) = fake_github().await;
    let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 16));
    let client = GithubClient::new(&base, cache.clone()).unwrap();

    client
        .list_repos(&token("good-token"), 1, 10, RepoFilter::All)
        .await
        .unwrap();
    assert_eq!(cache.len(), 1);

    let status = client
        .create_webhook(
            &token("good-token"),
            "acme",
            "site",
            "https://panel.example.com/github-webhook",
            None,
        )
        .await
        .unwrap();
    assert_eq!(status, HookStatus::AlreadyExists);
    assert!(cache.is_empty());
}

fn client(base: &str) -> (GithubClient, Arc<ResponseCache>) {
    let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 16));
    (GithubClient::new(base, cache.clone()).unwrap(), cache)
}

#[tokio::test]
async fn test_create_repo_sends_settings() {
    let (base, hits) = fake_github().await;
    let (client, _) = client(&base);

    let request = CreateRepoRequest {
        name: "new-site".to_string(),
        description: Some("landing page".to_string()),
        private: true,
        auto_init: true,
        gitignore_template: Some("Python".to_string()),
    };
    let repo = client.create_repo(&token("good-token"), &request).await.unwrap();
    assert_eq!(repo.full_name, "acme/new-site");

    let sent = hits.last_body();
    assert_eq!(sent["private"], true);
    assert_eq!(sent["auto_init"], true);
    assert_eq!(sent["gitignore_template"], "Python");

    let taken = CreateRepoRequest {
        name: "taken".to_string(),
        description: None,
        private: false,
        auto_init: true,
        gitignore_template: None,
    };
    let err = client.create_repo(&token("good-token"), &taken).await.unwrap_err();
    match err {
        PanelError::ValidationError(message) => {
            assert!(message.contains("name already exists"), "{message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rename_and_delete() {
    let (base, hits) = fake_github().await;
    let (client, _) = client(&base);

    let patch = RepoPatch {
        name: Some("site-v2".to_string()),
        description: None,
    };
    let renamed = client
        .update_repo(&token("good-token"), "acme", "site", &patch)
        .await
        .unwrap();
    assert_eq!(renamed.name, "site-v2");
    // unset fields are not sent, so GitHub keeps them
    assert!(hits.last_body().get("description").is_none());

    let empty = client
        .update_repo(&token("good-token"), "acme", "site", &RepoPatch::default())
        .await;
    assert!(matches!(empty, Err(PanelError::ValidationError(_))));

    client
        .delete_repo(&token("good-token"), "acme", "site")
        .await
        .unwrap();
    assert_eq!(hits.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_browse_and_edit_file() {
    let (base, hits) = fake_github().await;
    let (client, cache) = client(&base);
    let token = token("good-token");

    let root = client.get_contents(&token, "acme", "site", "/").await.unwrap();
    match root {
        Contents::Directory(items) => assert_eq!(items.len(), 2),
        other => panic!("expected a listing, got {other:?}"),
    }

    let readme = client
        .get_contents(&token, "acme", "site", "README.md")
        .await
        .unwrap();
    let item = match readme {
        Contents::File(item) => item,
        other => panic!("expected a file, got {other:?}"),
    };
    assert_eq!(file_text(&item).unwrap().as_deref(), Some("hello\n"));
    assert_eq!(cache.len(), 2);

    let edit = FileEdit {
        path: "README.md",
        message: "Update README.md",
        content: "hello, world\n",
        sha: &item.sha,
    };
    let commit = client.update_file(&token, "acme", "site", &edit).await.unwrap();
    assert_eq!(commit, "c0ffee");
    assert_eq!(hits.last_body()["content"], "aGVsbG8sIHdvcmxkCg==");
    assert_eq!(hits.last_body()["sha"], "b10b");
    assert!(cache.is_empty());

    let stale = FileEdit { sha: "stale", ..edit };
    let err = client.update_file(&token, "acme", "site", &stale).await.unwrap_err();
    assert!(matches!(err, PanelError::ValidationError(_)));

    let escape = client.get_contents(&token, "acme", "site", "../other").await;
    assert!(matches!(escape, Err(PanelError::ValidationError(_))));
}

#[tokio::test]
async fn test_zipball_download() {
    let (base, _) = fake_github().await;
    let (client, _) = client(&base);

    let bytes = client
        .download_zipball(&token("good-token"), "acme", "site")
        .await
        .unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert!(bytes.len() <= MAX_ZIPBALL_BYTES);

    let empty = client
        .download_zipball(&token("good-token"), "acme", "empty")
        .await
        .unwrap_err();
    assert!(matches!(empty, PanelError::GithubError(_)));
}

async fn service(base: &str, dir: &std::path::Path) -> GithubService {
    let (client, _) = client(base);
    let vault = Arc::new(crate::common::vault());
    let accounts = Arc::new(
        AccountStore::open(File::new(dir.join("accounts.json")))
            .await
            .unwrap(),
    );
    let subscriptions = Arc::new(
        SubscriptionStore::open(File::new(dir.join("subscriptions.json")))
            .await
            .unwrap(),
    );
    let encrypted = vault.encrypt("good-token").unwrap().unwrap();
    accounts.link(7, "alice", encrypted).await.unwrap();
    GithubService::new(Arc::new(client), accounts, subscriptions, vault, None, None)
}

#[tokio::test]
async fn test_service_repo_management() {
    let (base, hits) = fake_github().await;
    let dir = tempfile::tempdir().unwrap();
    let github = service(&base, dir.path()).await;

    let new = NewRepo {
        name: " new-site ".to_string(),
        description: Some("  ".to_string()),
        private: false,
        gitignore_template: Some("None".to_string()),
    };
    let repo = github.create_repo(7, new).await.unwrap();
    assert_eq!(repo.name, "new-site");
    let sent = hits.last_body();
    assert_eq!(sent["name"], "new-site");
    assert!(sent.get("description").is_none());
    assert!(sent.get("gitignore_template").is_none());

    match github.contents(7, "acme", "site", "").await.unwrap() {
        RepoContents::Directory(items) => {
            let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
            assert_eq!(names, ["src", "README.md"]);
        }
        other => panic!("expected a listing, got {other:?}"),
    }
    match github.contents(7, "acme", "site", "README.md").await.unwrap() {
        RepoContents::File { item, text } => {
            assert_eq!(item.sha, "b10b");
            assert_eq!(text.as_deref(), Some("hello\n"));
        }
        other => panic!("expected a file, got {other:?}"),
    }

    let refused = github.delete_repo(7, "acme", "site", "acme/site").await;
    assert!(matches!(refused, Err(PanelError::ValidationError(_))));
    assert_eq!(hits.deletes.load(Ordering::SeqCst), 0);

    github.delete_repo(7, "acme", "site", "site").await.unwrap();
    assert_eq!(hits.deletes.load(Ordering::SeqCst), 1);

    let unlinked = github.download_archive(8, "acme", "site").await;
    assert!(matches!(unlinked, Err(PanelError::ValidationError(_))));
}
