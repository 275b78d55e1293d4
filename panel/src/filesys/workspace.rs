//! Scratch directories for deploy runs

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::PanelError;

/// Prefix of every working tree directory under the workspaces root
pub const WORKING_TREE_PREFIX: &str = "deploy-";

/// A uniquely named scratch directory owned by exactly one deploy run.
///
/// The directory and everything below it is removed when the guard is
/// dropped, on success and failure alike.
#[derive(Debug)]
pub struct WorkingTree {
    root: PathBuf,
    repo_dir: PathBuf,
}

impl WorkingTree {
    /// Create `<workspaces>/deploy-<uuid>`; the repository lives in `repo/` below it
    pub fn create(workspaces: &Path) -> Result<Self, PanelError> {
        let root = workspaces.join(format!("{}{}", WORKING_TREE_PREFIX, Uuid::new_v4()));
        std::fs::create_dir_all(&root)?;
        debug!("Created working tree {:?}", root);
        Ok(Self {
            repo_dir: root.join("repo"),
            root,
        })
    }

    /// Directory the repository is cloned into
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for WorkingTree {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed working tree {:?}", self.root),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove working tree {:?}: {}", self.root, e),
        }
    }
}
