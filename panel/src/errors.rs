//! Error types for repodeck

use thiserror::Error;

/// Main error type for repodeck
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Key material missing or ciphertext produced under another key
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// SSH transport or authentication failure, including timeouts
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Clone error: {0}")]
    CloneError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("Push error: {0}")]
    PushError(String),

    /// Non-zero exit from a git or remote shell command
    #[error("Command failed with exit code {exit_code}: {stderr}")]
    CommandError {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("GitHub API error: {0}")]
    GithubError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The user already has a deploy executing
    #[error("Busy: {0}")]
    Busy(String),

    /// A cancel request stopped the pipeline between two steps
    #[error("Cancelled")]
    Cancelled,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for PanelError {
    fn from(err: anyhow::Error) -> Self {
        PanelError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PanelError {
    fn from(err: tokio::task::JoinError) -> Self {
        PanelError::Internal(format!("worker task failed: {err}"))
    }
}
