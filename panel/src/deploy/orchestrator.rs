//! Deploy orchestrator
//!
//! Drives a deploy conversation from method choice to a terminal state,
//! dispatching the blocking pipeline to a worker and rendering the outcome.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::deploy::archive::{ArchiveMode, ArchiveUpload};
use crate::deploy::cancel::CancelFlag;
use crate::deploy::classify::{classify, FailureKind};
use crate::deploy::executor::{ArchiveJob, DeployExecutor, DeployJob, RemoteJob};
use crate::deploy::fsm::{DeployEvent, DeployMethod, DeployStage, Outcome};
use crate::deploy::render::RenderableState;
use crate::deploy::session::{DeploySession, ExecutionSlot, SessionStore};
use crate::deploy::sync::{CommitAuthor, SyncOutcome};
use crate::errors::PanelError;
use crate::github::{authenticated_clone_url, validate_repo_name};
use crate::storage::accounts::AccountStore;
use crate::storage::profiles::ProfileStore;
use crate::storage::UserId;
use crate::vault::Vault;
use crate::workers::blocking::run_blocking;

const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// One user input event
#[derive(Debug, Clone)]
pub enum DeployInput {
    ChooseMethod(DeployMethod),
    Archive(ArchiveUpload),
    /// Remote path or commit message, depending on the step
    Text(String),
    ChangePath,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Base of clone URLs, e.g. `https://github.com`
    pub github_web_url: String,
    pub commit_email_domain: String,
}

#[derive(Debug, Clone)]
pub struct StartedDeploy {
    pub session_id: String,
    pub state: RenderableState,
}

/// Deploy orchestrator
pub struct DeployOrchestrator {
    sessions: SessionStore,
    profiles: Arc<dyn ProfileStore>,
    accounts: Arc<AccountStore>,
    vault: Arc<Vault>,
    executor: Arc<DeployExecutor>,
    options: OrchestratorOptions,
}

impl DeployOrchestrator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        accounts: Arc<AccountStore>,
        vault: Arc<Vault>,
        executor: Arc<DeployExecutor>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            profiles,
            accounts,
            vault,
            executor,
            options,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Open a session for `owner/repo` and show the method menu.
    ///
    /// Rejected with `Busy` while the user's previous deploy is executing.
    pub async fn start_deploy(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
    ) -> Result<StartedDeploy, PanelError> {
        validate_repo_name(owner, repo)?;

        let profile = self.profiles.get_profile(user).await?;
        let session = DeploySession::new(user, owner, repo);
        let session_id = session.id.clone();
        self.sessions.open(session)?;

        info!("Deploy session {} opened for {}/{} by user {}", session_id, owner, repo, user);
        Ok(StartedDeploy {
            session_id,
            state: RenderableState::method_menu(
                owner,
                repo,
                profile.as_ref().map(|p| p.host.as_str()),
            ),
        })
    }

    /// Feed one input into the session and return what to show next
    pub async fn advance(
        &self,
        session_id: &str,
        input: DeployInput,
    ) -> Result<RenderableState, PanelError> {
        let mut session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| PanelError::NotFound(format!("deploy session {}", session_id)))?;
        session.touch();

        let stage = session.fsm.stage().clone();
        match (stage, input) {
            (DeployStage::ChoosingMethod, DeployInput::ChooseMethod(method)) => {
                if method == DeployMethod::Remote
                    && self.profiles.get_profile(session.user_id).await?.is_none()
                {
                    let menu = RenderableState::method_menu(&session.owner, &session.repo, None);
                    self.sessions.save(session);
                    return Ok(RenderableState::rejected_input(
                        "Add a server profile before pushing from a server.",
                        menu,
                    ));
                }
                transition(&mut session, DeployEvent::ChooseMethod(method))?;
                self.sessions.save(session);
                Ok(match method {
                    DeployMethod::Archive => RenderableState::ask_archive(),
                    DeployMethod::Remote => RenderableState::ask_remote_path(),
                })
            }

            (DeployStage::CollectingArchive, DeployInput::Archive(upload)) => {
                if let Err(e) = upload.validate() {
                    self.sessions.save(session);
                    return Ok(RenderableState::rejected_input(
                        &e.to_string(),
                        RenderableState::ask_archive(),
                    ));
                }
                session.archive = Some(Arc::new(upload));
                transition(&mut session, DeployEvent::ArchiveReceived)?;
                self.sessions.save(session);
                Ok(RenderableState::ask_commit_message())
            }

            (DeployStage::CollectingRemotePath, DeployInput::Text(path)) => {
                match normalize_remote_path(&path) {
                    Ok(path) => {
                        session.remote_path = Some(path);
                        transition(&mut session, DeployEvent::PathReceived)?;
                        self.sessions.save(session);
                        Ok(RenderableState::ask_commit_message())
                    }
                    Err(reason) => {
                        self.sessions.save(session);
                        Ok(RenderableState::rejected_input(
                            reason,
                            RenderableState::ask_remote_path(),
                        ))
                    }
                }
            }

            (DeployStage::CollectingCommitMessage(method), DeployInput::Text(message)) => {
                let message = message.trim().to_string();
                if message.is_empty() {
                    self.sessions.save(session);
                    return Ok(RenderableState::rejected_input(
                        "The commit message must not be empty.",
                        RenderableState::ask_commit_message(),
                    ));
                }
                self.execute(session, method, message).await
            }

            (
                DeployStage::Finished(Outcome::Failed { path_error: true }),
                DeployInput::ChangePath,
            ) => {
                session.remote_path = None;
                transition(&mut session, DeployEvent::ChangePath)?;
                self.sessions.save(session);
                Ok(RenderableState::ask_remote_path())
            }

            (stage, _) => {
                let prompt = self.prompt_for(&stage, &session).await?;
                self.sessions.save(session);
                Ok(RenderableState::rejected_input(
                    "That input does not fit this step.",
                    prompt,
                ))
            }
        }
    }

    /// Abandon the session. A running pipeline finishes its current step,
    /// runs nothing after it and still removes its working tree.
    pub fn cancel(&self, session_id: &str) -> Result<RenderableState, PanelError> {
        let mut session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| PanelError::NotFound(format!("deploy session {}", session_id)))?;
        session.cancel.cancel();

        let executing = session.fsm.is_executing();
        if let Err(e) = session.fsm.process(DeployEvent::Cancel) {
            // finished sessions are just released
            info!("Released deploy session {}: {}", session_id, e);
        }

        info!("Deploy session {} cancelled", session_id);
        Ok(RenderableState::cancelled(executing))
    }

    /// Push an archive as the first commit of a freshly created repository.
    ///
    /// Runs outside any conversation but shares the per-user execution slot
    /// with deploys.
    pub async fn push_initial_archive(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
        upload: ArchiveUpload,
    ) -> Result<SyncOutcome, PanelError> {
        validate_repo_name(owner, repo)?;
        upload.validate()?;
        let slot = self.sessions.begin_execution(user)?;

        let account = self.accounts.get(user).await.ok_or_else(|| {
            PanelError::ValidationError("Link your GitHub account before deploying.".to_string())
        })?;
        let token = self.decrypt(&account.encrypted_token)?;
        let job = ArchiveJob {
            upload: Arc::new(upload),
            clone_url: authenticated_clone_url(&self.options.github_web_url, owner, repo, &token)?,
            // keeps the README and .gitignore GitHub generated
            mode: ArchiveMode::Overlay,
            author: CommitAuthor::github_user(
                &account.github_username,
                &self.options.commit_email_domain,
            ),
            message: INITIAL_COMMIT_MESSAGE.to_string(),
            cancel: CancelFlag::new(),
        };

        info!("Initial push of {} to {}/{} by user {}", job.upload.file_name, owner, repo, user);
        let executor = self.executor.clone();
        run_blocking("initial-push", move || {
            let _slot = slot;
            executor.execute(DeployJob::Archive(job))
        })
        .await
    }

    async fn execute(
        &self,
        mut session: DeploySession,
        method: DeployMethod,
        message: String,
    ) -> Result<RenderableState, PanelError> {
        let slot = self.sessions.begin_execution(session.user_id)?;
        let result = self.run_pipeline(&mut session, method, message, slot).await;

        let (outcome, state) = match result {
            Ok(SyncOutcome::Committed { output }) => (
                Outcome::Success,
                RenderableState::success(
                    &session.owner,
                    &session.repo,
                    method,
                    session.remote_path.as_deref(),
                    &output,
                ),
            ),
            Ok(SyncOutcome::NoChanges) => (
                Outcome::NoChanges,
                RenderableState::no_changes(&session.owner, &session.repo),
            ),
            Ok(SyncOutcome::Cancelled) => (
                Outcome::Cancelled,
                RenderableState::stopped(&session.owner, &session.repo),
            ),
            Err(PanelError::ValidationError(reason)) => (
                Outcome::Failed { path_error: false },
                RenderableState::blocked(&reason),
            ),
            Err(e) => {
                let path_error =
                    method == DeployMethod::Remote && classify(&e) == FailureKind::Path;
                warn!("Deploy session {} failed: {}", session.id, e);
                (
                    Outcome::Failed { path_error },
                    RenderableState::failure(&e, method),
                )
            }
        };

        transition(&mut session, DeployEvent::Completed(outcome))?;
        info!("Deploy session {} finished: {:?}", session.id, outcome);

        if outcome == (Outcome::Failed { path_error: true }) {
            // kept so the user can pick another path
            self.sessions.save(session);
        } else {
            self.sessions.remove(&session.id);
        }
        Ok(state)
    }

    /// The slot travels with the blocking job, so it is released when the
    /// work really ends, even if the caller stopped waiting.
    async fn run_pipeline(
        &self,
        session: &mut DeploySession,
        method: DeployMethod,
        message: String,
        slot: ExecutionSlot,
    ) -> Result<SyncOutcome, PanelError> {
        transition(session, DeployEvent::MessageReceived)?;
        self.sessions.save(session.clone());

        let job = self.prepare_job(session, method, message).await?;
        let executor = self.executor.clone();
        run_blocking("deploy", move || {
            let _slot = slot;
            executor.execute(job)
        })
        .await
    }

    /// Gather and decrypt everything the pipeline needs
    async fn prepare_job(
        &self,
        session: &DeploySession,
        method: DeployMethod,
        message: String,
    ) -> Result<DeployJob, PanelError> {
        let account = self.accounts.get(session.user_id).await.ok_or_else(|| {
            PanelError::ValidationError("Link your GitHub account before deploying.".to_string())
        })?;
        let author =
            CommitAuthor::github_user(&account.github_username, &self.options.commit_email_domain);

        match method {
            DeployMethod::Archive => {
                let upload = session.archive.clone().ok_or_else(|| {
                    PanelError::Internal("archive missing from session".to_string())
                })?;
                let token = self.decrypt(&account.encrypted_token)?;
                let clone_url = authenticated_clone_url(
                    &self.options.github_web_url,
                    &session.owner,
                    &session.repo,
                    &token,
                )?;
                Ok(DeployJob::Archive(ArchiveJob {
                    upload,
                    clone_url,
                    mode: ArchiveMode::Replace,
                    author,
                    message,
                    cancel: session.cancel.clone(),
                }))
            }
            DeployMethod::Remote => {
                let profile = self.profiles.get_profile(session.user_id).await?.ok_or_else(|| {
                    PanelError::ValidationError(
                        "The server profile was removed. Add it again to push from a server."
                            .to_string(),
                    )
                })?;
                let path = session.remote_path.clone().ok_or_else(|| {
                    PanelError::Internal("remote path missing from session".to_string())
                })?;
                Ok(DeployJob::Remote(RemoteJob {
                    target: profile.target(),
                    secret: self.decrypt(&profile.encrypted_secret)?,
                    path,
                    author,
                    message,
                    cancel: session.cancel.clone(),
                }))
            }
        }
    }

    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, PanelError> {
        match self.vault.decrypt(ciphertext)? {
            Some(secret) if !secret.expose_secret().is_empty() => Ok(secret),
            _ => Err(PanelError::CryptoError("no stored secret".to_string())),
        }
    }

    async fn prompt_for(
        &self,
        stage: &DeployStage,
        session: &DeploySession,
    ) -> Result<RenderableState, PanelError> {
        match stage {
            DeployStage::ChoosingMethod => {
                let profile = self.profiles.get_profile(session.user_id).await?;
                Ok(RenderableState::method_menu(
                    &session.owner,
                    &session.repo,
                    profile.as_ref().map(|p| p.host.as_str()),
                ))
            }
            DeployStage::CollectingArchive => Ok(RenderableState::ask_archive()),
            DeployStage::CollectingRemotePath => Ok(RenderableState::ask_remote_path()),
            DeployStage::CollectingCommitMessage(_) => Ok(RenderableState::ask_commit_message()),
            DeployStage::Executing(_) if self.sessions.is_executing(session.user_id) => Err(
                PanelError::Busy("the deploy is running; wait for its result".to_string()),
            ),
            DeployStage::Executing(_) => Err(PanelError::ValidationError(
                "this deploy was interrupted; start a new one".to_string(),
            )),
            DeployStage::Finished(_) => Err(PanelError::ValidationError(
                "this deploy has finished; start a new one".to_string(),
            )),
        }
    }
}

fn transition(session: &mut DeploySession, event: DeployEvent) -> Result<(), PanelError> {
    session.fsm.process(event).map_err(PanelError::Internal)
}

/// Trim, drop a trailing slash and reject empty or control characters
pub fn normalize_remote_path(raw: &str) -> Result<String, &'static str> {
    let path = raw.trim();
    if path.is_empty() {
        return Err("The path must not be empty.");
    }
    if path.chars().any(char::is_control) {
        return Err("The path must be a single line.");
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/" } else { trimmed }.to_string())
}
