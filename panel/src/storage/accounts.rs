//! Linked GitHub accounts

use serde::{Deserialize, Serialize};

use crate::errors::PanelError;
use crate::filesys::file::File;
use crate::storage::records::{RecordStore, UserId};

/// Which repositories the listing shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoFilter {
    #[default]
    All,
    Owner,
}

impl RepoFilter {
    /// Value of the `affiliation` query parameter
    pub fn affiliation(self) -> &'static str {
        match self {
            RepoFilter::All => "owner,collaborator,organization_member",
            RepoFilter::Owner => "owner",
        }
    }

    fn toggled(self) -> Self {
        match self {
            RepoFilter::All => RepoFilter::Owner,
            RepoFilter::Owner => RepoFilter::All,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubAccount {
    pub github_username: String,
    /// Vault ciphertext of the personal access token
    pub encrypted_token: String,
    /// Skip push notifications for pushes made by this account
    #[serde(default)]
    pub ignore_own_pushes: bool,
    #[serde(default)]
    pub repo_filter: RepoFilter,
}

impl std::fmt::Debug for GithubAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubAccount")
            .field("github_username", &self.github_username)
            .field("encrypted_token", &"[REDACTED]")
            .field("ignore_own_pushes", &self.ignore_own_pushes)
            .field("repo_filter", &self.repo_filter)
            .finish()
    }
}

pub struct AccountStore {
    records: RecordStore<GithubAccount>,
}

impl AccountStore {
    pub async fn open(file: File) -> Result<Self, PanelError> {
        Ok(Self {
            records: RecordStore::open(file).await?,
        })
    }

    /// Store a login. Preferences of an existing account are kept.
    pub async fn link(
        &self,
        user: UserId,
        github_username: &str,
        encrypted_token: String,
    ) -> Result<(), PanelError> {
        let username = github_username.to_string();
        self.records
            .upsert_with(
                user,
                || GithubAccount {
                    github_username: username.clone(),
                    encrypted_token: String::new(),
                    ignore_own_pushes: false,
                    repo_filter: RepoFilter::All,
                },
                |account| {
                    account.github_username = username.clone();
                    account.encrypted_token = encrypted_token;
                },
            )
            .await
    }

    pub async fn get(&self, user: UserId) -> Option<GithubAccount> {
        self.records.get(user).await
    }

    /// Flip `ignore_own_pushes`; `None` without a linked account
    pub async fn toggle_ignore_own_pushes(&self, user: UserId) -> Result<Option<bool>, PanelError> {
        self.records
            .update(user, |account| {
                account.ignore_own_pushes = !account.ignore_own_pushes;
                account.ignore_own_pushes
            })
            .await
    }

    /// Switch between all repositories and owned ones
    pub async fn toggle_repo_filter(&self, user: UserId) -> Result<Option<RepoFilter>, PanelError> {
        self.records
            .update(user, |account| {
                account.repo_filter = account.repo_filter.toggled();
                account.repo_filter
            })
            .await
    }
}
