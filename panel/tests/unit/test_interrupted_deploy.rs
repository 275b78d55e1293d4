//! Deploys that are cancelled or abandoned while the pipeline runs

use std::time::Duration;

use repodeck::deploy::fsm::DeployMethod;
use repodeck::deploy::orchestrator::DeployInput;
use repodeck::deploy::render::StateKind;
use repodeck::errors::PanelError;

use crate::common::{slow_git_server, Fixture};

const USER: i64 = 7;

/// Walk a remote deploy up to the commit message prompt
async fn ready_to_execute(fx: &Fixture) -> String {
    fx.link_account(USER, "alice").await;
    fx.add_server(USER).await;

    let orch = &fx.orchestrator;
    let id = orch.start_deploy(USER, "acme", "site").await.unwrap().session_id;
    orch.advance(&id, DeployInput::ChooseMethod(DeployMethod::Remote))
        .await
        .unwrap();
    orch.advance(&id, DeployInput::Text("/var/www/site".to_string()))
        .await
        .unwrap();
    id
}

async fn wait_until_idle(fx: &Fixture) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while fx.orchestrator.sessions().is_executing(USER) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_dropped_request_frees_user_when_pipeline_ends() {
    let fx = Fixture::new(slow_git_server).await;
    let id = ready_to_execute(&fx).await;

    let orchestrator = fx.orchestrator.clone();
    let advance_id = id.clone();
    let task = tokio::spawn(async move {
        orchestrator
            .advance(&advance_id, DeployInput::Text("update".to_string()))
            .await
    });
    fx.transport.wait_for_connection().await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    // the job keeps running without its caller and still holds the user
    let err = fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap_err();
    assert!(matches!(err, PanelError::Busy(_)));

    wait_until_idle(&fx).await;
    assert!(fx.transport.commands().iter().any(|c| c.ends_with("git push")));

    let err = fx
        .orchestrator
        .advance(&id, DeployInput::Text("again".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::ValidationError(msg) if msg.contains("interrupted")));

    fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
    assert_eq!(fx.orchestrator.sessions().len(), 1);
}

#[tokio::test]
async fn test_cancel_during_execution_stops_before_push() {
    let fx = Fixture::new(slow_git_server).await;
    let id = ready_to_execute(&fx).await;

    let orchestrator = fx.orchestrator.clone();
    let advance_id = id.clone();
    let task = tokio::spawn(async move {
        orchestrator
            .advance(&advance_id, DeployInput::Text("update".to_string()))
            .await
    });
    fx.transport.wait_for_connection().await;

    let cancelled = fx.orchestrator.cancel(&id).unwrap();
    assert_eq!(cancelled.kind, StateKind::Cancelled);

    let state = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(state.kind, StateKind::Cancelled);
    assert!(state.text.contains("Nothing was pushed"));

    let commands = fx.transport.commands();
    assert!(commands.len() < 5);
    assert!(commands
        .iter()
        .all(|c| !c.contains("git push") && !c.contains(" commit ")));

    assert!(!fx.orchestrator.sessions().is_executing(USER));
    assert!(fx.orchestrator.sessions().is_empty());
    fx.orchestrator.start_deploy(USER, "acme", "site").await.unwrap();
}
