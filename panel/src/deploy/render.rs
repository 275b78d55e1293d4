//! User-facing deploy states
//!
//! Text is HTML (the chat surface renders a small tag subset). Anything that
//! came from a remote process or the user is escaped and truncated first.

use panel_api::models::{ActionButton, RenderedState};

use crate::deploy::classify::{classify, FailureKind};
use crate::deploy::fsm::DeployMethod;
use crate::errors::PanelError;

/// Longest raw output shown on success
pub const RESULT_PREVIEW_CHARS: usize = 100;
/// Longest raw output shown on failure
pub const ERROR_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Prompt,
    Success,
    NoChanges,
    Error,
    Cancelled,
}

impl StateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StateKind::Prompt => "prompt",
            StateKind::Success => "success",
            StateKind::NoChanges => "no_changes",
            StateKind::Error => "error",
            StateKind::Cancelled => "cancelled",
        }
    }
}

/// A button the front-end shows under the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ChooseArchive,
    ChooseRemote,
    ChangePath,
    /// Start a fresh deploy for the same repository
    Restart,
    Cancel,
}

impl Action {
    pub fn id(self) -> &'static str {
        match self {
            Action::ChooseArchive => "choose_method:archive",
            Action::ChooseRemote => "choose_method:remote",
            Action::ChangePath => "change_path",
            Action::Restart => "restart",
            Action::Cancel => "cancel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::ChooseArchive => "Upload archive",
            Action::ChooseRemote => "Push from server",
            Action::ChangePath => "Change path",
            Action::Restart => "Try again",
            Action::Cancel => "Cancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableState {
    pub kind: StateKind,
    pub text: String,
    pub actions: Vec<Action>,
}

impl RenderableState {
    fn new(kind: StateKind, text: String, actions: Vec<Action>) -> Self {
        Self {
            kind,
            text,
            actions,
        }
    }

    /// Terminal states end the conversation; prompts wait for input
    pub fn is_terminal(&self) -> bool {
        self.kind != StateKind::Prompt
    }

    pub fn has_action(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    /// First screen. The remote option only appears with a server profile.
    pub fn method_menu(owner: &str, repo: &str, server: Option<&str>) -> Self {
        let mut text = format!(
            "Deploy to <b>{}</b>\nHow do you want to deliver the new content?",
            repo_label(owner, repo)
        );
        let mut actions = vec![Action::ChooseArchive];
        match server {
            Some(host) => {
                text.push_str(&format!("\nServer: <code>{}</code>", escape_html(host)));
                actions.push(Action::ChooseRemote);
            }
            None => text.push_str("\nAdd a server profile to push from your server."),
        }
        actions.push(Action::Cancel);
        Self::new(StateKind::Prompt, text, actions)
    }

    pub fn ask_archive() -> Self {
        Self::new(
            StateKind::Prompt,
            "Send a <b>.zip</b> archive. Its content replaces everything in the repository."
                .to_string(),
            vec![Action::Cancel],
        )
    }

    pub fn ask_remote_path() -> Self {
        Self::new(
            StateKind::Prompt,
            "Send the absolute path of the repository on your server, e.g. <code>/var/www/site</code>."
                .to_string(),
            vec![Action::Cancel],
        )
    }

    pub fn ask_commit_message() -> Self {
        Self::new(
            StateKind::Prompt,
            "Send the commit message.".to_string(),
            vec![Action::Cancel],
        )
    }

    /// Input did not fit the current step; the step is asked again
    pub fn rejected_input(reason: &str, retry: RenderableState) -> Self {
        Self::new(
            StateKind::Prompt,
            format!("{}\n\n{}", escape_html(reason), retry.text),
            retry.actions,
        )
    }

    pub fn success(
        owner: &str,
        repo: &str,
        method: DeployMethod,
        remote_path: Option<&str>,
        output: &str,
    ) -> Self {
        let mut text = format!("Pushed to <b>{}</b>", repo_label(owner, repo));
        match (method, remote_path) {
            (DeployMethod::Remote, Some(path)) => {
                text.push_str(&format!(" from <code>{}</code>", escape_html(path)));
            }
            _ => text.push_str(" from the uploaded archive"),
        }
        let preview = preview(output, RESULT_PREVIEW_CHARS);
        if !preview.is_empty() {
            text.push_str(&format!("\n<pre>{}</pre>", preview));
        }
        Self::new(StateKind::Success, text, Vec::new())
    }

    pub fn no_changes(owner: &str, repo: &str) -> Self {
        Self::new(
            StateKind::NoChanges,
            format!(
                "No changes: <b>{}</b> already matches this content. Nothing was committed.",
                repo_label(owner, repo)
            ),
            Vec::new(),
        )
    }

    /// One distinct message per failure kind.
    ///
    /// "Change path" is offered only for path errors of the remote method.
    pub fn failure(err: &PanelError, method: DeployMethod) -> Self {
        let kind = classify(err);
        let headline = match kind {
            FailureKind::Credentials => {
                "Stored credentials can no longer be decrypted. Set them up again."
            }
            FailureKind::Connection => "SSH error: could not connect to the server.",
            FailureKind::Clone => "Could not clone the repository.",
            FailureKind::Archive => "The archive could not be used.",
            FailureKind::Path => "Path error: the directory does not exist or is not a repository.",
            FailureKind::Push => "Push rejected. Resolve it on the remote and deploy again.",
            FailureKind::Command => "A git command failed.",
            FailureKind::Internal => "Unexpected error.",
        };

        let mut text = headline.to_string();
        let detail = preview(&error_detail(err), ERROR_PREVIEW_CHARS);
        if !detail.is_empty() {
            text.push_str(&format!("\n<pre>{}</pre>", detail));
        }

        let actions = if kind.allows_change_path() && method == DeployMethod::Remote {
            vec![Action::ChangePath, Action::Restart]
        } else {
            vec![Action::Restart]
        };
        Self::new(StateKind::Error, text, actions)
    }

    /// Failure that happened before execution, e.g. missing account
    pub fn blocked(reason: &str) -> Self {
        Self::new(StateKind::Error, escape_html(reason), vec![Action::Restart])
    }

    pub fn cancelled(executing: bool) -> Self {
        let text = if executing {
            "Deploy cancelled. The step already running finishes; nothing after it runs."
        } else {
            "Deploy cancelled."
        };
        Self::new(StateKind::Cancelled, text.to_string(), Vec::new())
    }

    /// The pipeline noticed a cancel request and stopped before pushing
    pub fn stopped(owner: &str, repo: &str) -> Self {
        Self::new(
            StateKind::Cancelled,
            format!(
                "Deploy to <b>{}</b> stopped after cancel. Nothing was pushed.",
                repo_label(owner, repo)
            ),
            Vec::new(),
        )
    }
}

impl From<RenderableState> for RenderedState {
    fn from(state: RenderableState) -> Self {
        RenderedState {
            kind: state.kind.as_str().to_string(),
            terminal: state.is_terminal(),
            text: state.text,
            actions: state
                .actions
                .into_iter()
                .map(|a| ActionButton {
                    id: a.id().to_string(),
                    label: a.label().to_string(),
                })
                .collect(),
        }
    }
}

fn repo_label(owner: &str, repo: &str) -> String {
    escape_html(&format!("{}/{}", owner, repo))
}

fn error_detail(err: &PanelError) -> String {
    match err {
        PanelError::CommandError { stdout, stderr, .. } => {
            if stderr.trim().is_empty() {
                stdout.clone()
            } else {
                stderr.clone()
            }
        }
        PanelError::CryptoError(_) => String::new(),
        PanelError::ConnectionError(msg)
        | PanelError::CloneError(msg)
        | PanelError::ArchiveError(msg)
        | PanelError::PushError(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Truncate then escape
fn preview(raw: &str, max_chars: usize) -> String {
    escape_html(&truncate_chars(raw.trim(), max_chars))
}

/// Cut to `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
