//! API models

use serde::{Deserialize, Serialize};

/// Authenticated user (`GET /user`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
}

/// Repository owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository (`GET /repos/{owner}/{repo}`, `GET /user/repos`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub html_url: String,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    pub updated_at: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Commit pointer inside a branch payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// Branch (`GET /repos/{owner}/{repo}/branches/{branch}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitRef,
}

/// Webhook creation request (`POST /repos/{owner}/{repo}/hooks`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateHookRequest {
    pub name: String,
    pub active: bool,
    pub events: Vec<String>,
    pub config: HookConfig,
}

/// Webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub url: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub insecure_ssl: String,
}

/// Repository creation request (`POST /user/repos`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepoRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub private: bool,
    /// Create an initial commit so the repository can be cloned
    pub auto_init: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gitignore_template: Option<String>,
}

/// Repository update (`PATCH /repos/{owner}/{repo}`); unset fields are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Entry of `GET /repos/{owner}/{repo}/contents/{path}`.
///
/// Directory listings carry no `content`; a single file carries it
/// base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    pub html_url: Option<String>,
    pub content: Option<String>,
    pub encoding: Option<String>,
}

/// A contents response is either a listing or one file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Directory(Vec<ContentItem>),
    File(ContentItem),
}

/// File write (`PUT /repos/{owner}/{repo}/contents/{path}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFileRequest {
    pub message: String,
    /// New content, base64-encoded
    pub content: String,
    /// Blob being replaced
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateFileResponse {
    pub commit: CommitRef,
}

/// Validation error body returned with 422
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationFailure {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ValidationDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationDetail {
    #[serde(default)]
    pub message: String,
}

/// Push event payload (`X-GitHub-Event: push`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub repository: PushRepository,
    pub pusher: Pusher,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    pub compare: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRepository {
    pub full_name: String,
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pusher {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushCommit {
    pub message: String,
}
