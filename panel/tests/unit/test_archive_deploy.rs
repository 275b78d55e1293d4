//! Archive deploys against a local bare repository

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use repodeck::deploy::archive::{ArchiveMode, ArchiveUpload};
use repodeck::deploy::cancel::CancelFlag;
use repodeck::deploy::executor::{ArchiveJob, DeployExecutor, ExecutorOptions};
use repodeck::deploy::fsm::DeployMethod;
use repodeck::deploy::orchestrator::DeployInput;
use repodeck::deploy::render::{Action, RenderableState, StateKind};
use repodeck::deploy::sync::{CommitAuthor, SyncOutcome};
use repodeck::errors::PanelError;
use secrecy::SecretString;

use crate::common::{
    git, git_available, git_server, reject_pushes, seeded_bare_repo, zip_of, FakeTransport,
    Fixture,
};

const USER: i64 = 11;

fn executor(workspaces: &Path) -> DeployExecutor {
    DeployExecutor::new(
        Arc::new(FakeTransport::new(git_server)),
        ExecutorOptions {
            workspaces_dir: workspaces.to_path_buf(),
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
        },
    )
}

fn job(bare: &Path, files: &[(&str, &str)], message: &str) -> ArchiveJob {
    ArchiveJob {
        upload: Arc::new(ArchiveUpload::new("site.zip", zip_of(files))),
        clone_url: SecretString::from(bare.to_string_lossy().into_owned()),
        mode: ArchiveMode::Replace,
        author: CommitAuthor::github_user("alice", "users.noreply.github.com"),
        message: message.to_string(),
        cancel: CancelFlag::new(),
    }
}

fn tree_files(bare: &Path) -> Vec<String> {
    git(bare, &["ls-tree", "-r", "--name-only", "main"])
        .lines()
        .map(str::to_string)
        .collect()
}

fn leftover_trees(workspaces: &Path) -> usize {
    std::fs::read_dir(workspaces)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[test]
fn test_archive_replaces_repository_content() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let bare = seeded_bare_repo(
        tmp.path(),
        &[("index.html", "old"), ("README.md", "readme"), ("css/old.css", "a{}")],
    );
    let workspaces = tmp.path().join("workspaces");
    let executor = executor(&workspaces);

    let files = [("index.html", "new"), ("js/app.js", "console.log(1)")];
    let outcome = executor
        .run_archive(job(&bare, &files, "Replace site"))
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Committed { .. }));

    assert_eq!(tree_files(&bare), vec!["index.html", "js/app.js"]);
    assert_eq!(git(&bare, &["show", "main:index.html"]), "new");
    let log = git(&bare, &["log", "-1", "--format=%an <%ae> %s", "main"]);
    assert_eq!(
        log.trim(),
        "alice <alice@users.noreply.github.com> Replace site"
    );
    assert_eq!(leftover_trees(&workspaces), 0);

    // the same content again changes nothing
    let again = executor.run_archive(job(&bare, &files, "Again")).unwrap();
    assert_eq!(again, SyncOutcome::NoChanges);
    let count = git(&bare, &["rev-list", "--count", "main"]);
    assert_eq!(count.trim(), "2");
    assert_eq!(leftover_trees(&workspaces), 0);
}

#[test]
fn test_clone_failure_cleans_up() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let workspaces = tmp.path().join("workspaces");
    let executor = executor(&workspaces);

    let missing = tmp.path().join("nowhere.git");
    let err = executor
        .run_archive(job(&missing, &[("index.html", "x")], "msg"))
        .unwrap_err();
    assert!(matches!(err, PanelError::CloneError(_)));
    assert_eq!(leftover_trees(&workspaces), 0);
}

#[test]
fn test_empty_archive_never_clones() {
    let tmp = tempfile::tempdir().unwrap();
    let workspaces = tmp.path().join("workspaces");
    let executor = executor(&workspaces);

    let err = executor
        .run_archive(job(&tmp.path().join("unused.git"), &[], "msg"))
        .unwrap_err();
    assert!(matches!(err, PanelError::ArchiveError(msg) if msg.contains("no files")));
    assert!(!workspaces.exists());
}

/// A fixture whose clone URLs point at `<mirror>/<owner>/<repo>.git`
async fn mirrored_fixture(mirror: &Path) -> Fixture {
    let fx = Fixture::with_github_web_url(git_server, &format!("file://{}/", mirror.display())).await;
    fx.link_account(USER, "alice").await;
    fx
}

async fn archive_conversation(
    fx: &Fixture,
    repo: &str,
    files: &[(&str, &str)],
    message: &str,
) -> RenderableState {
    let orch = &fx.orchestrator;
    let id = orch.start_deploy(USER, "acme", repo).await.unwrap().session_id;
    orch.advance(&id, DeployInput::ChooseMethod(DeployMethod::Archive))
        .await
        .unwrap();
    let state = orch
        .advance(
            &id,
            DeployInput::Archive(ArchiveUpload::new("site.zip", zip_of(files))),
        )
        .await
        .unwrap();
    assert_eq!(state.kind, StateKind::Prompt);
    orch.advance(&id, DeployInput::Text(message.to_string()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_identical_archive_reports_no_changes() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let mirror = tempfile::tempdir().unwrap();
    let content = [("index.html", "<h1>hi</h1>"), ("css/site.css", "a{}")];
    let bare = seeded_bare_repo(&mirror.path().join("acme"), &content);
    let fx = mirrored_fixture(mirror.path()).await;

    let state = archive_conversation(&fx, "origin", &content, "Same content").await;

    assert_eq!(state.kind, StateKind::NoChanges);
    assert!(state.text.contains("acme/origin"));
    assert_eq!(git(&bare, &["rev-list", "--count", "main"]).trim(), "1");
    assert_eq!(leftover_trees(&fx.workspaces()), 0);
    assert!(fx.orchestrator.sessions().is_empty());
}

#[tokio::test]
async fn test_rejected_push_is_reported_and_cleaned_up() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let mirror = tempfile::tempdir().unwrap();
    let bare = seeded_bare_repo(&mirror.path().join("acme"), &[("index.html", "old")]);
    reject_pushes(&bare);
    let fx = mirrored_fixture(mirror.path()).await;

    let state = archive_conversation(&fx, "origin", &[("index.html", "new")], "Blocked").await;

    assert_eq!(state.kind, StateKind::Error);
    assert!(state.text.contains("Push rejected"));
    assert!(state.text.contains("pushes are frozen"));
    assert!(!state.has_action(Action::ChangePath));
    assert_eq!(git(&bare, &["rev-list", "--count", "main"]).trim(), "1");
    assert_eq!(git(&bare, &["show", "main:index.html"]), "old");
    assert_eq!(leftover_trees(&fx.workspaces()), 0);
    assert!(fx.orchestrator.sessions().is_empty());
}

#[tokio::test]
async fn test_initial_push_keeps_generated_files() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let mirror = tempfile::tempdir().unwrap();
    let bare = seeded_bare_repo(
        &mirror.path().join("acme"),
        &[("README.md", "# origin"), (".gitignore", "__pycache__/")],
    );
    let fx = mirrored_fixture(mirror.path()).await;

    let upload = ArchiveUpload::new("code.zip", zip_of(&[("app.py", "print('hi')")]));
    let outcome = fx
        .orchestrator
        .push_initial_archive(USER, "acme", "origin", upload)
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Committed { .. }));
    assert_eq!(tree_files(&bare), vec![".gitignore", "README.md", "app.py"]);
    assert_eq!(git(&bare, &["log", "-1", "--format=%s", "main"]).trim(), "Initial commit");
    assert_eq!(leftover_trees(&fx.workspaces()), 0);
    assert!(!fx.orchestrator.sessions().is_executing(USER));
}

#[tokio::test]
async fn test_initial_push_rejects_bad_archive_before_cloning() {
    let mirror = tempfile::tempdir().unwrap();
    let fx = mirrored_fixture(mirror.path()).await;

    let upload = ArchiveUpload::new("code.tar", b"not a zip".to_vec());
    let err = fx
        .orchestrator
        .push_initial_archive(USER, "acme", "origin", upload)
        .await
        .unwrap_err();

    assert!(matches!(err, PanelError::ArchiveError(_)));
    assert_eq!(leftover_trees(&fx.workspaces()), 0);
}
