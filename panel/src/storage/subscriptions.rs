//! Push notification subscriptions

use std::collections::BTreeSet;

use crate::errors::PanelError;
use crate::filesys::file::File;
use crate::storage::records::{RecordStore, UserId};

/// `owner/repo` names per user, stored lowercase
pub struct SubscriptionStore {
    records: RecordStore<BTreeSet<String>>,
}

impl SubscriptionStore {
    pub async fn open(file: File) -> Result<Self, PanelError> {
        Ok(Self {
            records: RecordStore::open(file).await?,
        })
    }

    /// Returns `false` when the subscription already existed
    pub async fn subscribe(&self, user: UserId, repo_full_name: &str) -> Result<bool, PanelError> {
        let key = repo_full_name.to_lowercase();
        self.records
            .upsert_with(user, BTreeSet::new, |repos| repos.insert(key))
            .await
    }

    pub async fn subscriptions(&self, user: UserId) -> Vec<String> {
        self.records
            .get(user)
            .await
            .map(|repos| repos.into_iter().collect())
            .unwrap_or_default()
    }

    /// Users subscribed to `repo_full_name`
    pub async fn subscribers(&self, repo_full_name: &str) -> Vec<UserId> {
        let key = repo_full_name.to_lowercase();
        self.records
            .entries()
            .await
            .into_iter()
            .filter(|(_, repos)| repos.contains(&key))
            .map(|(user, _)| user)
            .collect()
    }
}
