//! Per-user SSH server profiles

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PanelError;
use crate::filesys::file::File;
use crate::ssh::SshTarget;
use crate::storage::records::{RecordStore, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Password,
    Key,
}

impl AuthKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthKind::Password => "password",
            AuthKind::Key => "key",
        }
    }
}

/// One server per user. `encrypted_secret` is vault ciphertext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_kind: AuthKind,
    pub encrypted_secret: String,
}

impl ServerProfile {
    pub fn target(&self) -> SshTarget {
        SshTarget {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }
}

impl std::fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("auth_kind", &self.auth_kind)
            .field("encrypted_secret", &"[REDACTED]")
            .finish()
    }
}

/// Single-row-per-user profile storage
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Replace every field of the user's profile at once
    async fn upsert_profile(&self, user: UserId, profile: ServerProfile) -> Result<(), PanelError>;

    async fn get_profile(&self, user: UserId) -> Result<Option<ServerProfile>, PanelError>;

    /// Returns whether a profile existed
    async fn delete_profile(&self, user: UserId) -> Result<bool, PanelError>;
}

/// Profiles kept in `profiles.json`
pub struct JsonProfileStore {
    records: RecordStore<ServerProfile>,
}

impl JsonProfileStore {
    pub async fn open(file: File) -> Result<Self, PanelError> {
        Ok(Self {
            records: RecordStore::open(file).await?,
        })
    }
}

#[async_trait]
impl ProfileStore for JsonProfileStore {
    async fn upsert_profile(&self, user: UserId, profile: ServerProfile) -> Result<(), PanelError> {
        self.records.put(user, profile).await
    }

    async fn get_profile(&self, user: UserId) -> Result<Option<ServerProfile>, PanelError> {
        Ok(self.records.get(user).await)
    }

    async fn delete_profile(&self, user: UserId) -> Result<bool, PanelError> {
        Ok(self.records.remove(user).await?.is_some())
    }
}
