//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::PanelError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Everything repodeck keeps on disk lives under `base_dir`
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Server profiles, one per user
    pub fn profiles_file(&self) -> File {
        File::new(self.base_dir.join("profiles.json"))
    }

    /// Linked GitHub accounts
    pub fn accounts_file(&self) -> File {
        File::new(self.base_dir.join("accounts.json"))
    }

    /// Push notification subscriptions
    pub fn subscriptions_file(&self) -> File {
        File::new(self.base_dir.join("subscriptions.json"))
    }

    /// Host keys accepted on first use
    pub fn known_hosts_file(&self) -> File {
        File::new(self.base_dir.join("known_hosts"))
    }

    /// Scratch space for archive deploys
    pub fn workspaces_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("workspaces"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), PanelError> {
        Dir::new(&self.base_dir).create().await?;
        self.workspaces_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".repodeck");
        Self::new(base_dir)
    }
}
