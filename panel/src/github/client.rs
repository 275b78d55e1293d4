//! GitHub REST client

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use github_api::models::{
    Branch, ContentItem, Contents, CreateHookRequest, CreateRepoRequest, HookConfig, RepoPatch,
    Repository, UpdateFileRequest, UpdateFileResponse, User, ValidationFailure,
};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::cache::response::{CacheKey, ResponseCache};
use crate::errors::PanelError;
use crate::github::{normalize_content_path, validate_new_name, validate_repo_name};
use crate::storage::accounts::RepoFilter;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Largest zipball handed back to the caller
pub const MAX_ZIPBALL_BYTES: usize = 49 * 1024 * 1024;

/// One page of repositories
#[derive(Debug, Clone)]
pub struct RepoPage {
    pub repos: Vec<Repository>,
    pub has_next: bool,
}

/// Head of the default branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub branch: String,
    pub sha: String,
}

/// New content for one file
#[derive(Debug, Clone, Copy)]
pub struct FileEdit<'a> {
    pub path: &'a str,
    pub message: &'a str,
    pub content: &'a str,
    /// Blob the edit started from; GitHub answers 409 when the file changed since
    pub sha: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    Created,
    AlreadyExists,
}

/// HTTP client for the GitHub REST API.
///
/// GET responses go through the injected cache, keyed by token.
pub struct GithubClient {
    client: Client,
    api_base: String,
    cache: Arc<ResponseCache>,
}

impl GithubClient {
    /// Create a new GitHub client
    pub fn new(api_base: &str, cache: Arc<ResponseCache>) -> Result<Self, PanelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("repodeck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            cache,
        })
    }

    /// Get the base URL
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// The account the token belongs to; also validates the token
    pub async fn get_user(&self, token: &SecretString) -> Result<User, PanelError> {
        self.get(token, "/user", &[]).await
    }

    /// Repositories visible to the token, most recently updated first
    pub async fn list_repos(
        &self,
        token: &SecretString,
        page: u32,
        per_page: u32,
        filter: RepoFilter,
    ) -> Result<RepoPage, PanelError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let params = [
            ("affiliation", filter.affiliation().to_string()),
            ("sort", "updated".to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];

        let repos: Vec<Repository> = self.get(token, "/user/repos", &params).await?;
        let has_next = repos.len() == per_page as usize;
        Ok(RepoPage { repos, has_next })
    }

    pub async fn get_repo(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
    ) -> Result<Repository, PanelError> {
        validate_repo_name(owner, repo)?;
        self.get(token, &format!("/repos/{}/{}", owner, repo), &[]).await
    }

    /// SHA at the tip of the default branch
    pub async fn default_branch_head(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
    ) -> Result<BranchHead, PanelError> {
        let repository = self.get_repo(token, owner, repo).await?;
        let path = format!(
            "/repos/{}/{}/branches/{}",
            owner, repo, repository.default_branch
        );
        let branch: Branch = self.get(token, &path, &[]).await?;
        Ok(BranchHead {
            branch: branch.name,
            sha: branch.commit.sha,
        })
    }

    /// Register a push webhook; an existing identical hook counts as success
    pub async fn create_webhook(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
        target_url: &str,
        secret: Option<&SecretString>,
    ) -> Result<HookStatus, PanelError> {
        validate_repo_name(owner, repo)?;
        let url = format!("{}/repos/{}/{}/hooks", self.api_base, owner, repo);
        debug!("POST {}", url);

        let body = CreateHookRequest {
            name: "web".to_string(),
            active: true,
            events: vec!["push".to_string()],
            config: HookConfig {
                url: target_url.to_string(),
                content_type: "json".to_string(),
                secret: secret.map(|s| s.expose_secret().to_string()),
                insecure_ssl: "0".to_string(),
            },
        };
        let response = self
            .authorized(self.client.post(&url), token)
            .json(&body)
            .send()
            .await?;

        // hooks change what the token sees
        self.cache.invalidate_credential(token.expose_secret());

        match response.status() {
            status if status.is_success() => {
                info!("Created webhook for {}/{}", owner, repo);
                Ok(HookStatus::Created)
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                let failure: ValidationFailure = response.json().await.unwrap_or_default();
                if failure
                    .errors
                    .iter()
                    .any(|e| e.message.contains("Hook already exists"))
                {
                    info!("Webhook for {}/{} already exists", owner, repo);
                    Ok(HookStatus::AlreadyExists)
                } else {
                    Err(PanelError::GithubError(format!(
                        "webhook rejected: {}",
                        failure.message
                    )))
                }
            }
            _ => Err(Self::failure(response, &url).await),
        }
    }

    /// Create a repository owned by the token's account
    pub async fn create_repo(
        &self,
        token: &SecretString,
        request: &CreateRepoRequest,
    ) -> Result<Repository, PanelError> {
        validate_new_name(&request.name)?;
        let url = format!("{}/user/repos", self.api_base);
        debug!("POST {}", url);

        let response = self
            .mutate(self.client.post(&url).json(request), token, &url)
            .await?;
        let repository: Repository = response.json().await?;
        info!("Created repository {}", repository.full_name);
        Ok(repository)
    }

    /// Rename a repository or change its description
    pub async fn update_repo(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
        patch: &RepoPatch,
    ) -> Result<Repository, PanelError> {
        validate_repo_name(owner, repo)?;
        if let Some(name) = &patch.name {
            validate_new_name(name)?;
        }
        if patch.name.is_none() && patch.description.is_none() {
            return Err(PanelError::ValidationError("nothing to change".to_string()));
        }
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        debug!("PATCH {}", url);

        let response = self
            .mutate(self.client.patch(&url).json(patch), token, &url)
            .await?;
        let repository: Repository = response.json().await?;
        info!("Updated repository {}/{} -> {}", owner, repo, repository.full_name);
        Ok(repository)
    }

    /// Delete a repository; the token needs the `delete_repo` scope
    pub async fn delete_repo(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
    ) -> Result<(), PanelError> {
        validate_repo_name(owner, repo)?;
        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        debug!("DELETE {}", url);

        self.mutate(self.client.delete(&url), token, &url).await?;
        info!("Deleted repository {}/{}", owner, repo);
        Ok(())
    }

    /// Directory listing or single file at `path` on the default branch
    pub async fn get_contents(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Contents, PanelError> {
        validate_repo_name(owner, repo)?;
        let path = normalize_content_path(path)?;
        let endpoint = if path.is_empty() {
            format!("/repos/{}/{}/contents", owner, repo)
        } else {
            format!("/repos/{}/{}/contents/{}", owner, repo, path)
        };
        self.get(token, &endpoint, &[]).await
    }

    /// Replace one file and commit; returns the commit SHA
    pub async fn update_file(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
        edit: &FileEdit<'_>,
    ) -> Result<String, PanelError> {
        validate_repo_name(owner, repo)?;
        let path = normalize_content_path(edit.path)?;
        if path.is_empty() {
            return Err(PanelError::ValidationError("a file path is required".to_string()));
        }
        let url = format!("{}/repos/{}/{}/contents/{}", self.api_base, owner, repo, path);
        debug!("PUT {}", url);

        let body = UpdateFileRequest {
            message: edit.message.to_string(),
            content: B64.encode(edit.content.as_bytes()),
            sha: edit.sha.to_string(),
        };
        let response = self
            .mutate(self.client.put(&url).json(&body), token, &url)
            .await?;
        let updated: UpdateFileResponse = response.json().await?;
        info!("Committed {} to {}/{} as {}", path, owner, repo, updated.commit.sha);
        Ok(updated.commit.sha)
    }

    /// Zip of the default branch, at most [`MAX_ZIPBALL_BYTES`]
    pub async fn download_zipball(
        &self,
        token: &SecretString,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<u8>, PanelError> {
        validate_repo_name(owner, repo)?;
        let url = format!("{}/repos/{}/{}/zipball", self.api_base, owner, repo);
        debug!("GET {}", url);

        let mut response = self.authorized(self.client.get(&url), token).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &url).await);
        }
        if let Some(len) = response.content_length() {
            if len > MAX_ZIPBALL_BYTES as u64 {
                return Err(zipball_too_large(len));
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > MAX_ZIPBALL_BYTES {
                return Err(zipball_too_large(bytes.len() as u64));
            }
        }
        if bytes.is_empty() {
            return Err(PanelError::GithubError(format!(
                "empty archive for {}/{}",
                owner, repo
            )));
        }
        Ok(bytes)
    }

    /// Send a write; the credential's cached reads are dropped either way
    async fn mutate(
        &self,
        request: RequestBuilder,
        token: &SecretString,
        url: &str,
    ) -> Result<Response, PanelError> {
        let response = self.authorized(request, token).send().await?;
        self.cache.invalidate_credential(token.expose_secret());
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::failure(response, url).await)
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &SecretString,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, PanelError> {
        let key = CacheKey::new(token.expose_secret(), path, params);
        if let Some(value) = self.cache.get(&key) {
            debug!("Cache hit for {}", path);
            return Ok(serde_json::from_value(value)?);
        }

        let url = format!("{}{}", self.api_base, path);
        debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(&url), token)
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, &url).await);
        }

        let value: serde_json::Value = response.json().await?;
        let parsed = serde_json::from_value(value.clone())?;
        self.cache.insert(key, value);
        Ok(parsed)
    }

    fn authorized(&self, request: RequestBuilder, token: &SecretString) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("Bearer {}", token.expose_secret()))
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn failure(response: Response, url: &str) -> PanelError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("GitHub request failed: {} {} - {}", status, url, body);
        match status {
            StatusCode::NOT_FOUND => PanelError::NotFound(url.to_string()),
            StatusCode::UNAUTHORIZED => {
                PanelError::ValidationError("GitHub rejected the token".to_string())
            }
            StatusCode::FORBIDDEN | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                let failure: ValidationFailure = serde_json::from_str(&body).unwrap_or_default();
                let detail = failure
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .find(|m| !m.is_empty())
                    .unwrap_or(failure.message);
                PanelError::ValidationError(format!("GitHub refused the request: {}", detail))
            }
            _ => PanelError::GithubError(format!("{}: {}", status, body)),
        }
    }
}

/// UTF-8 text of a file entry; `None` for binary content
pub fn file_text(item: &ContentItem) -> Result<Option<String>, PanelError> {
    let encoded = match (&item.content, item.encoding.as_deref()) {
        (Some(content), Some("base64")) => content,
        (Some(_), other) => {
            return Err(PanelError::GithubError(format!(
                "unsupported content encoding {:?} for {}",
                other, item.path
            )))
        }
        (None, _) => {
            return Err(PanelError::ValidationError(format!("{} is not a file", item.path)))
        }
    };
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = B64
        .decode(compact)
        .map_err(|e| PanelError::GithubError(format!("bad content for {}: {}", item.path, e)))?;
    Ok(String::from_utf8(bytes).ok())
}

fn zipball_too_large(len: u64) -> PanelError {
    PanelError::ValidationError(format!(
        "archive is {:.2} MiB, over the {} MiB limit",
        len as f64 / (1024.0 * 1024.0),
        MAX_ZIPBALL_BYTES / (1024 * 1024)
    ))
}
