//! Control API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// ================================= DEPLOYS ===================================== //

/// Start a deploy conversation for a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDeployRequest {
    pub user_id: i64,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartDeployResponse {
    pub session_id: String,
    pub state: RenderedState,
}

/// One user input for a running deploy conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInputRequest {
    pub input: DeployInputPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployInputPayload {
    /// Button press selecting `archive` or `remote`
    ChooseMethod { method: String },
    /// Uploaded file
    Archive {
        file_name: String,
        content_base64: String,
    },
    /// Free text (remote path or commit message)
    Text { text: String },
    /// "Change path" recovery button
    ChangePath,
}

/// State rendered for the chat surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedState {
    /// One of `prompt`, `success`, `no_changes`, `error`, `cancelled`
    pub kind: String,
    /// HTML-safe message text
    pub text: String,
    #[serde(default)]
    pub actions: Vec<ActionButton>,
    /// Whether the conversation is over
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionButton {
    pub id: String,
    pub label: String,
}

// ================================== USERS ====================================== //

#[derive(Clone, Serialize, Deserialize)]
pub struct GithubLoginRequest {
    pub token: String,
}

impl std::fmt::Debug for GithubLoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubLoginRequest")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubLoginResponse {
    pub github_username: String,
}

/// Notification and listing preferences of a linked account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPreferencesResponse {
    pub github_username: String,
    pub ignore_own_pushes: bool,
    /// `all` or `owner`
    pub repo_filter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub owner: String,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoPageResponse {
    pub repos: Vec<RepoSummary>,
    pub page: u32,
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoDetailsResponse {
    pub repo: RepoSummary,
    pub description: Option<String>,
    pub default_branch: String,
    pub head_sha: String,
}

/// New repository, optionally seeded from a zip archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepositoryRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    /// `.gitignore` template name; `None` or `"None"` for no template
    pub gitignore_template: Option<String>,
    pub archive: Option<ArchiveAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveAttachment {
    pub file_name: String,
    pub content_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepositoryResponse {
    pub repo: RepoSummary,
    /// Present when an archive was attached
    pub initial_push: Option<InitialPushReport>,
}

/// The repository exists even when the initial push failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialPushReport {
    /// `committed`, `no_changes` or `failed`
    pub status: String,
    pub message: Option<String>,
}

/// Rename and/or redescribe; absent fields are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRepositoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    /// `file`, `dir`, `symlink` or `submodule`
    pub kind: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileView {
    pub path: String,
    pub sha: String,
    pub size: u64,
    pub html_url: Option<String>,
    /// `None` for binary files
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentsResponse {
    Directory {
        path: String,
        entries: Vec<ContentEntry>,
    },
    File(FileView),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditFileRequest {
    pub path: String,
    pub content: String,
    /// Blob SHA the edit started from
    pub sha: String,
    /// Defaults to `Update <path>`
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditFileResponse {
    pub commit_sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub repo_full_name: String,
    /// `created`, `already_exists` or `skipped`
    pub hook: String,
}

/// SSH server registration
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerProfileRequest {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ServerProfileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProfileRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProfileResponse {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_kind: String,
}

/// Queued chat notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub link: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

/// Webhook delivery acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub event: String,
    /// Users a notification was queued for
    pub delivered: usize,
}
