//! Commit-and-push over any shell
//!
//! The same step sequence runs against a freshly cloned local tree and
//! against a working copy on a user's server. Each step is a single shell
//! invocation that first changes into the tree, so a missing directory fails
//! the very first step. Steps stay separate invocations because the no-op
//! check needs the exit code of `git diff --cached --quiet` on its own, and
//! a cancel request is honoured between them.

use std::time::Duration;

use tracing::{debug, info};

use crate::deploy::cancel::CancelFlag;
use crate::deploy::git::redact_credentials;
use crate::errors::PanelError;
use crate::ssh::{chain, shell_quote, CommandResult, RemoteSession};

/// Runs one shell script and reports its result
pub trait ShellRunner {
    fn run(&mut self, script: &str) -> Result<CommandResult, PanelError>;
}

/// Runs scripts over an open SSH session
pub struct RemoteShell<'a> {
    session: &'a mut dyn RemoteSession,
    timeout: Duration,
}

impl<'a> RemoteShell<'a> {
    pub fn new(session: &'a mut dyn RemoteSession, timeout: Duration) -> Self {
        Self { session, timeout }
    }
}

impl ShellRunner for RemoteShell<'_> {
    fn run(&mut self, script: &str) -> Result<CommandResult, PanelError> {
        self.session.execute(script, self.timeout)
    }
}

/// Identity recorded as author and committer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    /// Author derived from a GitHub login
    pub fn github_user(login: &str, email_domain: &str) -> Self {
        Self {
            name: login.to_string(),
            email: format!("{}@{}", login, email_domain),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Push the current branch to whatever it tracks
    Tracked,
    /// Push HEAD to `origin`, setting upstream
    Origin,
}

impl PushMode {
    fn command(self) -> &'static str {
        match self {
            PushMode::Tracked => "git push",
            PushMode::Origin => "git push --set-upstream origin HEAD",
        }
    }
}

/// What to synchronize
#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    /// Working tree path as seen by the shell
    pub tree: &'a str,
    pub author: &'a CommitAuthor,
    pub message: &'a str,
    pub push: PushMode,
    pub cancel: &'a CancelFlag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A commit was created and pushed; `output` is what git reported
    Committed { output: String },
    /// The tree already matched HEAD; nothing was committed or pushed
    NoChanges,
    /// Stopped by a cancel request before the push ran
    Cancelled,
}

/// Stage everything, commit it when it differs from HEAD, then push.
///
/// Errors:
/// - status check, staging or commit failure: `CommandError` with the raw output
/// - push failure: `PushError`
/// - cancel requested before a step: `Cancelled`
pub fn commit_and_push(
    shell: &mut dyn ShellRunner,
    request: &SyncRequest<'_>,
) -> Result<SyncOutcome, PanelError> {
    let cd = change_dir(request.tree);
    let mut step = |command: &str| -> Result<CommandResult, PanelError> {
        request.cancel.check()?;
        shell.run(&chain(&[cd.as_str(), command]))
    };

    // the tree must exist and be a repository
    let status = step("git status --porcelain")?;
    ensure_success(&status)?;

    let staged = step("git add -A")?;
    ensure_success(&staged)?;

    let diff = step("git diff --cached --quiet")?;
    match diff.exit_code {
        0 => {
            info!("No changes to commit in {}", request.tree);
            return Ok(SyncOutcome::NoChanges);
        }
        1 => debug!("Staged changes found in {}", request.tree),
        _ => return Err(command_error(&diff)),
    }

    let commit_cmd = format!(
        "git -c user.name={name} -c user.email={email} commit -m {message}",
        name = shell_quote(&request.author.name),
        email = shell_quote(&request.author.email),
        message = shell_quote(request.message),
    );
    let commit = step(commit_cmd.as_str())?;
    if !commit.success() {
        if commit.combined_output().contains("nothing to commit") {
            return Ok(SyncOutcome::NoChanges);
        }
        return Err(command_error(&commit));
    }

    let push = step(request.push.command())?;
    if !push.success() {
        return Err(PanelError::PushError(redact_credentials(
            &push.combined_output(),
        )));
    }

    let mut output = push.combined_output();
    if output.is_empty() {
        output = commit.stdout.lines().next().unwrap_or_default().to_string();
    }
    info!("Pushed {} as {}", request.tree, request.author.name);
    Ok(SyncOutcome::Committed {
        output: redact_credentials(&output),
    })
}

/// `cd` into `tree`, keeping a leading `~/` unquoted so the shell expands it
fn change_dir(tree: &str) -> String {
    match tree.strip_prefix("~/") {
        Some(rest) => format!("cd ~/{}", shell_quote(rest)),
        None if tree == "~" => "cd ~".to_string(),
        None => format!("cd {}", shell_quote(tree)),
    }
}

fn ensure_success(result: &CommandResult) -> Result<(), PanelError> {
    if result.success() {
        Ok(())
    } else {
        Err(command_error(result))
    }
}

fn command_error(result: &CommandResult) -> PanelError {
    PanelError::CommandError {
        exit_code: result.exit_code,
        stdout: redact_credentials(result.stdout.trim()),
        stderr: redact_credentials(result.stderr.trim()),
    }
}
