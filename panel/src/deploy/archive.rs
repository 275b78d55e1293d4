//! Turning an uploaded archive into a working tree
//!
//! Archive contents replace the tracked files entirely: everything except
//! the `.git` directory is removed before unpacking, so files missing from
//! the archive show up as deletions.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path};

use secrecy::SecretString;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::deploy::cancel::CancelFlag;
use crate::deploy::git;
use crate::errors::PanelError;
use crate::filesys::workspace::WorkingTree;

const GIT_DIR: &str = ".git";

/// An archive received from the user, held in memory until execution
#[derive(Clone)]
pub struct ArchiveUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ArchiveUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveUpload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ArchiveUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Reject anything that is not a readable zip with at least one file
    pub fn validate(&self) -> Result<(), PanelError> {
        if !self.file_name.to_ascii_lowercase().ends_with(".zip") {
            return Err(PanelError::ArchiveError(format!(
                "unsupported archive type: {}",
                self.file_name
            )));
        }

        let mut archive = self.open()?;
        let mut files = 0usize;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(malformed)?;
            if entry.is_file() {
                files += 1;
            }
        }
        if files == 0 {
            return Err(PanelError::ArchiveError("archive contains no files".to_string()));
        }
        Ok(())
    }

    fn open(&self) -> Result<ZipArchive<Cursor<&[u8]>>, PanelError> {
        ZipArchive::new(Cursor::new(self.bytes.as_slice())).map_err(malformed)
    }
}

/// How archive contents combine with the cloned files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// The archive becomes the whole tree
    Replace,
    /// Archive files are written over the clone; nothing is removed
    Overlay,
}

/// Clone the repository and lay the archive over it.
///
/// The upload is validated before anything touches the disk. On any failure,
/// cancellation included, the working tree is dropped, which removes it.
pub fn materialize(
    upload: &ArchiveUpload,
    clone_url: &SecretString,
    workspaces: &Path,
    mode: ArchiveMode,
    cancel: &CancelFlag,
) -> Result<WorkingTree, PanelError> {
    upload.validate()?;
    cancel.check()?;

    let tree = WorkingTree::create(workspaces)?;
    git::clone_repository(clone_url, tree.repo_dir())?;
    cancel.check()?;
    if mode == ArchiveMode::Replace {
        clear_tracked_content(tree.repo_dir())?;
        cancel.check()?;
    }
    unpack(upload, tree.repo_dir())?;

    Ok(tree)
}

/// Remove every entry of `dir` except the git metadata directory
pub fn clear_tracked_content(dir: &Path) -> Result<(), PanelError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == GIT_DIR {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Extract the archive into `dest`.
///
/// Entries that would escape `dest` or write into `.git` are skipped.
pub fn unpack(upload: &ArchiveUpload, dest: &Path) -> Result<(), PanelError> {
    let mut archive = upload.open()?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(malformed)?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        if relative.components().next() == Some(Component::Normal(GIT_DIR.as_ref())) {
            warn!("Skipping archive entry inside {}: {}", GIT_DIR, entry.name());
            continue;
        }

        let target = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode().map(|m| m & 0o777).filter(|m| *m != 0) {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        }
    }

    debug!("Unpacked {} entries into {:?}", archive.len(), dest);
    Ok(())
}

fn malformed(err: zip::result::ZipError) -> PanelError {
    PanelError::ArchiveError(format!("malformed archive: {}", err))
}
