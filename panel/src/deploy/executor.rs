//! Deploy executor
//!
//! Runs one deploy attempt to completion. Every method blocks; the
//! orchestrator submits them with [`crate::workers::blocking::run_blocking`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::deploy::archive::{self, ArchiveMode, ArchiveUpload};
use crate::deploy::cancel::CancelFlag;
use crate::deploy::git::LocalShell;
use crate::deploy::sync::{
    commit_and_push, CommitAuthor, PushMode, RemoteShell, SyncOutcome, SyncRequest,
};
use crate::errors::PanelError;
use crate::ssh::{RemoteTransport, SshTarget};

/// Replace a repository's content with an uploaded archive
pub struct ArchiveJob {
    pub upload: Arc<ArchiveUpload>,
    /// Clone URL with the access token embedded
    pub clone_url: SecretString,
    pub mode: ArchiveMode,
    pub author: CommitAuthor,
    pub message: String,
    pub cancel: CancelFlag,
}

/// Commit and push a working copy on the user's server
pub struct RemoteJob {
    pub target: SshTarget,
    pub secret: SecretString,
    pub path: String,
    pub author: CommitAuthor,
    pub message: String,
    pub cancel: CancelFlag,
}

pub enum DeployJob {
    Archive(ArchiveJob),
    Remote(RemoteJob),
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Parent of every local working tree
    pub workspaces_dir: PathBuf,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

/// Deploy executor
pub struct DeployExecutor {
    transport: Arc<dyn RemoteTransport>,
    options: ExecutorOptions,
}

impl DeployExecutor {
    pub fn new(transport: Arc<dyn RemoteTransport>, options: ExecutorOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run the job. A cancel noticed between steps ends it as
    /// [`SyncOutcome::Cancelled`].
    pub fn execute(&self, job: DeployJob) -> Result<SyncOutcome, PanelError> {
        let result = match job {
            DeployJob::Archive(job) => self.run_archive(job),
            DeployJob::Remote(job) => self.run_remote(job),
        };
        match result {
            Err(PanelError::Cancelled) => {
                info!("Deploy stopped after a cancel request");
                Ok(SyncOutcome::Cancelled)
            }
            other => other,
        }
    }

    /// Clone, replace content, commit and push inside a scratch directory.
    ///
    /// The working tree is removed before this returns, whatever the outcome.
    pub fn run_archive(&self, job: ArchiveJob) -> Result<SyncOutcome, PanelError> {
        info!("Archive deploy of {} as {}", job.upload.file_name, job.author.name);

        let tree = archive::materialize(
            &job.upload,
            &job.clone_url,
            &self.options.workspaces_dir,
            job.mode,
            &job.cancel,
        )?;
        let tree_path = tree.repo_dir().to_string_lossy().into_owned();

        let request = SyncRequest {
            tree: &tree_path,
            author: &job.author,
            message: &job.message,
            push: PushMode::Origin,
            cancel: &job.cancel,
        };
        let outcome = commit_and_push(&mut LocalShell, &request);

        drop(tree);
        outcome
    }

    /// Run the synchronizer on the server; the session is closed on every path
    pub fn run_remote(&self, job: RemoteJob) -> Result<SyncOutcome, PanelError> {
        info!("Remote deploy on {} at {}", job.target, job.path);

        job.cancel.check()?;
        let mut session =
            self.transport
                .connect(&job.target, &job.secret, self.options.connect_timeout)?;

        let request = SyncRequest {
            tree: &job.path,
            author: &job.author,
            message: &job.message,
            push: PushMode::Tracked,
            cancel: &job.cancel,
        };
        let outcome = {
            let mut shell = RemoteShell::new(session.as_mut(), self.options.command_timeout);
            commit_and_push(&mut shell, &request)
        };

        session.close();
        if let Err(e) = &outcome {
            warn!("Remote deploy on {} failed: {}", job.target, e);
        }
        outcome
    }
}
