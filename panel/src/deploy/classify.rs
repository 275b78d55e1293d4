//! Mapping pipeline errors to user-facing failure kinds

use crate::errors::PanelError;

/// Output fragments that mean the remote path is wrong
const PATH_ERROR_MARKERS: &[&str] = &[
    "no such file or directory",
    "can't cd to",
    "not a directory",
    "not a git repository",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Stored secret no longer decrypts; the user must set it up again
    Credentials,
    Connection,
    Clone,
    Archive,
    /// The remote path is missing or not a repository
    Path,
    Push,
    Command,
    Internal,
}

impl FailureKind {
    /// The user may retry with another path
    pub fn allows_change_path(self) -> bool {
        self == FailureKind::Path
    }
}

pub fn classify(err: &PanelError) -> FailureKind {
    match err {
        PanelError::CryptoError(_) => FailureKind::Credentials,
        PanelError::ConnectionError(_) => FailureKind::Connection,
        PanelError::CloneError(_) => FailureKind::Clone,
        PanelError::ArchiveError(_) => FailureKind::Archive,
        PanelError::PushError(_) => FailureKind::Push,
        PanelError::CommandError { stdout, stderr, .. } => {
            if is_path_error(stderr) || is_path_error(stdout) {
                FailureKind::Path
            } else {
                FailureKind::Command
            }
        }
        _ => FailureKind::Internal,
    }
}

/// Case-insensitive match against the known path failure messages
pub fn is_path_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    PATH_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}
