//! Account-aware GitHub operations
//!
//! Resolves the user's stored token before calling the REST client.

use std::sync::Arc;

use github_api::models::{ContentItem, Contents, CreateRepoRequest, RepoPatch, Repository};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::errors::PanelError;
use crate::github::client::{file_text, BranchHead, FileEdit, GithubClient, HookStatus, RepoPage};
use crate::github::validate_repo_name;
use crate::storage::accounts::{AccountStore, GithubAccount};
use crate::storage::subscriptions::SubscriptionStore;
use crate::storage::UserId;
use crate::vault::Vault;

/// Path the webhook route is mounted on
pub const WEBHOOK_PATH: &str = "/github-webhook";

pub struct RepoDetails {
    pub repo: Repository,
    pub head: BranchHead,
}

/// Result of a subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub repo_full_name: String,
    /// `None` when no public URL is configured and no hook was registered
    pub hook: Option<HookStatus>,
}

/// Settings of a repository to create
#[derive(Debug, Clone, Default)]
pub struct NewRepo {
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
    /// GitHub `.gitignore` template name, e.g. `Python`
    pub gitignore_template: Option<String>,
}

/// What a path in a repository holds
#[derive(Debug, Clone)]
pub enum RepoContents {
    /// Directories first, then files, each sorted by name
    Directory(Vec<ContentItem>),
    /// `text` is `None` for binary files
    File {
        item: ContentItem,
        text: Option<String>,
    },
}

pub struct GithubService {
    client: Arc<GithubClient>,
    accounts: Arc<AccountStore>,
    subscriptions: Arc<SubscriptionStore>,
    vault: Arc<Vault>,
    public_url: Option<String>,
    webhook_secret: Option<SecretString>,
}

impl GithubService {
    pub fn new(
        client: Arc<GithubClient>,
        accounts: Arc<AccountStore>,
        subscriptions: Arc<SubscriptionStore>,
        vault: Arc<Vault>,
        public_url: Option<String>,
        webhook_secret: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            accounts,
            subscriptions,
            vault,
            public_url,
            webhook_secret,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Validate the token against `/user` and store it encrypted.
    ///
    /// Returns the GitHub login.
    pub async fn link_account(
        &self,
        user: UserId,
        token: SecretString,
    ) -> Result<String, PanelError> {
        let token_str = token.expose_secret().trim();
        if token_str.is_empty() {
            return Err(PanelError::ValidationError("token is required".to_string()));
        }
        let token = SecretString::from(token_str.to_string());

        let github_user = self.client.get_user(&token).await?;
        let encrypted = self
            .vault
            .encrypt(token.expose_secret())?
            .ok_or_else(|| PanelError::ValidationError("token is required".to_string()))?;
        self.accounts.link(user, &github_user.login, encrypted).await?;

        info!("Linked GitHub account {} to user {}", github_user.login, user);
        Ok(github_user.login)
    }

    pub async fn list_repos(
        &self,
        user: UserId,
        page: u32,
        per_page: u32,
    ) -> Result<RepoPage, PanelError> {
        let account = self.require_account(user).await?;
        let token = self.decrypt(&account.encrypted_token)?;
        let filter = account.repo_filter;
        self.client.list_repos(&token, page, per_page, filter).await
    }

    pub async fn repo_details(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
    ) -> Result<RepoDetails, PanelError> {
        let token = self.token(user).await?;
        let repository = self.client.get_repo(&token, owner, repo).await?;
        let head = self.client.default_branch_head(&token, owner, repo).await?;
        Ok(RepoDetails {
            repo: repository,
            head,
        })
    }

    /// Register the push hook (when a public URL is known) and record the
    /// subscription
    pub async fn subscribe(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
    ) -> Result<Subscription, PanelError> {
        validate_repo_name(owner, repo)?;
        let token = self.token(user).await?;

        let hook = match &self.public_url {
            Some(base) => {
                let target = format!("{}{}", base.trim_end_matches('/'), WEBHOOK_PATH);
                Some(
                    self.client
                        .create_webhook(&token, owner, repo, &target, self.webhook_secret.as_ref())
                        .await?,
                )
            }
            None => {
                warn!("No public URL configured; skipping webhook for {}/{}", owner, repo);
                None
            }
        };

        let repo_full_name = format!("{}/{}", owner, repo).to_lowercase();
        self.subscriptions.subscribe(user, &repo_full_name).await?;
        Ok(Subscription {
            repo_full_name,
            hook,
        })
    }

    /// Create a repository with an initial commit, so it can be cloned at once
    pub async fn create_repo(&self, user: UserId, new: NewRepo) -> Result<Repository, PanelError> {
        let token = self.token(user).await?;
        let request = CreateRepoRequest {
            name: new.name.trim().to_string(),
            description: non_blank(new.description),
            private: new.private,
            auto_init: true,
            gitignore_template: non_blank(new.gitignore_template)
                .filter(|t| !t.eq_ignore_ascii_case("none")),
        };
        let repository = self.client.create_repo(&token, &request).await?;
        info!("User {} created {}", user, repository.full_name);
        Ok(repository)
    }

    /// Rename and/or redescribe a repository
    pub async fn update_repo(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Repository, PanelError> {
        let token = self.token(user).await?;
        let patch = RepoPatch {
            name: non_blank(name),
            // an empty description clears it
            description: description.map(|d| d.trim().to_string()),
        };
        self.client.update_repo(&token, owner, repo, &patch).await
    }

    /// Delete a repository once `confirm` repeats its name exactly
    pub async fn delete_repo(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
        confirm: &str,
    ) -> Result<(), PanelError> {
        if confirm != repo {
            return Err(PanelError::ValidationError(format!(
                "type {} to confirm the deletion",
                repo
            )));
        }
        let token = self.token(user).await?;
        self.client.delete_repo(&token, owner, repo).await?;
        warn!("User {} deleted {}/{}", user, owner, repo);
        Ok(())
    }

    pub async fn contents(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<RepoContents, PanelError> {
        let token = self.token(user).await?;
        match self.client.get_contents(&token, owner, repo, path).await? {
            Contents::Directory(mut items) => {
                items.sort_by(|a, b| {
                    (a.kind != "dir", a.name.to_lowercase())
                        .cmp(&(b.kind != "dir", b.name.to_lowercase()))
                });
                Ok(RepoContents::Directory(items))
            }
            Contents::File(item) => {
                let text = file_text(&item)?;
                Ok(RepoContents::File { item, text })
            }
        }
    }

    /// Commit new content for one file; returns the commit SHA
    pub async fn edit_file(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
        edit: FileEdit<'_>,
    ) -> Result<String, PanelError> {
        let token = self.token(user).await?;
        self.client.update_file(&token, owner, repo, &edit).await
    }

    /// Zip of the default branch
    pub async fn download_archive(
        &self,
        user: UserId,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<u8>, PanelError> {
        let token = self.token(user).await?;
        self.client.download_zipball(&token, owner, repo).await
    }

    async fn token(&self, user: UserId) -> Result<SecretString, PanelError> {
        let account = self.require_account(user).await?;
        self.decrypt(&account.encrypted_token)
    }

    async fn require_account(&self, user: UserId) -> Result<GithubAccount, PanelError> {
        self.accounts.get(user).await.ok_or_else(|| {
            PanelError::ValidationError("Link your GitHub account first.".to_string())
        })
    }

    fn decrypt(&self, ciphertext: &str) -> Result<SecretString, PanelError> {
        self.vault
            .decrypt(ciphertext)?
            .ok_or_else(|| PanelError::CryptoError("no stored token".to_string()))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
