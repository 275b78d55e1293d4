//! Remote deploy conversations over a scripted SSH server

use repodeck::deploy::archive::ArchiveUpload;
use repodeck::deploy::fsm::DeployMethod;
use repodeck::deploy::orchestrator::DeployInput;
use repodeck::deploy::render::{Action, StateKind};
use repodeck::errors::PanelError;

use crate::common::{git_server, zip_of, Fixture};

const USER: i64 = 42;

async fn remote_deploy(fx: &Fixture, path: &str) -> repodeck::deploy::render::RenderableState {
    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    assert!(started.state.has_action(Action::ChooseRemote));

    let orch = &fx.orchestrator;
    let id = started.session_id;
    let state = orch
        .advance(&id, DeployInput::ChooseMethod(DeployMethod::Remote))
        .await
        .unwrap();
    assert_eq!(state.kind, StateKind::Prompt);
    orch.advance(&id, DeployInput::Text(path.to_string()))
        .await
        .unwrap();
    orch.advance(&id, DeployInput::Text("update".to_string()))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_remote_success_reports_push_output() {
    let fx = Fixture::new(git_server).await;
    fx.link_account(USER, "alice").await;
    fx.add_server(USER).await;

    let state = remote_deploy(&fx, "/var/www/site").await;

    assert_eq!(state.kind, StateKind::Success);
    assert!(state.text.contains("acme/site"));
    assert!(state.text.contains("/var/www/site"));
    assert!(state.text.contains("main -&gt; main"));
    assert!(fx.orchestrator.sessions().is_empty());

    let commands = fx.transport.commands();
    assert_eq!(commands.len(), 5);
    assert!(commands.iter().all(|c| c.starts_with("cd /var/www/site && ")));
    assert!(commands[3].contains("user.email=alice@users.noreply.github.com"));
    assert_eq!(fx.transport.connections.lock().unwrap()[0].username, "deploy");
}

#[tokio::test]
async fn test_missing_path_offers_change_path() {
    let fx = Fixture::new(git_server).await;
    fx.link_account(USER, "alice").await;
    fx.add_server(USER).await;

    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    let id = started.session_id;
    let orch = &fx.orchestrator;
    orch.advance(&id, DeployInput::ChooseMethod(DeployMethod::Remote))
        .await
        .unwrap();
    orch.advance(&id, DeployInput::Text("/var/www/missing/".to_string()))
        .await
        .unwrap();
    let failed = orch
        .advance(&id, DeployInput::Text("update".to_string()))
        .await
        .unwrap();

    assert_eq!(failed.kind, StateKind::Error);
    assert!(failed.text.contains("Path error"));
    assert!(failed.has_action(Action::ChangePath));
    assert_eq!(fx.transport.commands().len(), 1);

    // the same session continues with another path
    let prompt = orch.advance(&id, DeployInput::ChangePath).await.unwrap();
    assert_eq!(prompt.kind, StateKind::Prompt);
    orch.advance(&id, DeployInput::Text("/var/www/site".to_string()))
        .await
        .unwrap();
    let done = orch
        .advance(&id, DeployInput::Text("second try".to_string()))
        .await
        .unwrap();
    assert_eq!(done.kind, StateKind::Success);
    assert!(orch.sessions().get(&id).is_none());
}

#[tokio::test]
async fn test_remote_choice_requires_profile() {
    let fx = Fixture::new(git_server).await;
    fx.link_account(USER, "alice").await;

    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    assert!(!started.state.has_action(Action::ChooseRemote));

    let state = fx
        .orchestrator
        .advance(
            &started.session_id,
            DeployInput::ChooseMethod(DeployMethod::Remote),
        )
        .await
        .unwrap();
    assert_eq!(state.kind, StateKind::Prompt);
    assert!(state.has_action(Action::ChooseArchive));
    assert!(fx.transport.commands().is_empty());
}

#[tokio::test]
async fn test_deploy_without_account_is_blocked() {
    let fx = Fixture::new(git_server).await;

    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    let id = started.session_id;
    let orch = &fx.orchestrator;
    orch.advance(&id, DeployInput::ChooseMethod(DeployMethod::Archive))
        .await
        .unwrap();
    let upload = ArchiveUpload::new("site.zip", zip_of(&[("index.html", "<h1>hi</h1>")]));
    orch.advance(&id, DeployInput::Archive(upload)).await.unwrap();
    let state = orch
        .advance(&id, DeployInput::Text("update".to_string()))
        .await
        .unwrap();

    assert_eq!(state.kind, StateKind::Error);
    assert!(state.text.contains("Link your GitHub account"));
    assert!(orch.sessions().is_empty());
}

#[tokio::test]
async fn test_bad_inputs_reprompt() {
    let fx = Fixture::new(git_server).await;
    fx.link_account(USER, "alice").await;

    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    let id = started.session_id;
    let orch = &fx.orchestrator;
    orch.advance(&id, DeployInput::ChooseMethod(DeployMethod::Archive))
        .await
        .unwrap();

    let wrong_type = orch
        .advance(&id, DeployInput::Archive(ArchiveUpload::new("site.tar.gz", vec![1, 2, 3])))
        .await
        .unwrap();
    assert_eq!(wrong_type.kind, StateKind::Prompt);
    assert!(wrong_type.text.contains("unsupported archive type"));

    let text_instead = orch
        .advance(&id, DeployInput::Text("hello".to_string()))
        .await
        .unwrap();
    assert_eq!(text_instead.kind, StateKind::Prompt);
    assert!(orch.sessions().get(&id).is_some());
}

#[tokio::test]
async fn test_cancel_and_unknown_session() {
    let fx = Fixture::new(git_server).await;

    let started = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    let state = fx.orchestrator.cancel(&started.session_id).unwrap();
    assert_eq!(state.kind, StateKind::Cancelled);

    let err = fx
        .orchestrator
        .advance(&started.session_id, DeployInput::ChangePath)
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::NotFound(_)));
    assert!(matches!(
        fx.orchestrator.cancel(&started.session_id),
        Err(PanelError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalid_repository_name() {
    let fx = Fixture::new(git_server).await;
    let err = fx
        .orchestrator
        .start_deploy(USER, "acme", "../etc")
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ValidationError(_)));
}
