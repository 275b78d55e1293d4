//! Remote shell access
//!
//! All operations here block the calling thread. Callers submit them through
//! [`crate::workers::blocking::run_blocking`].

pub mod command;
pub mod libssh;

use std::time::Duration;

use secrecy::SecretString;

use crate::errors::PanelError;

pub use command::{chain, shell_quote, CommandResult};

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl std::fmt::Display for SshTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Opens authenticated shell sessions
pub trait RemoteTransport: Send + Sync {
    /// Connect and authenticate with a password.
    ///
    /// Every failure (unreachable, handshake, rejected credentials, timeout)
    /// is reported as `PanelError::ConnectionError`.
    fn connect(
        &self,
        target: &SshTarget,
        secret: &SecretString,
        timeout: Duration,
    ) -> Result<Box<dyn RemoteSession>, PanelError>;
}

/// An open session able to run shell commands
pub trait RemoteSession: Send {
    /// Run one shell invocation and wait for it to exit.
    ///
    /// Both output streams are fully drained before the exit status is read.
    /// Exceeding `timeout` is a `ConnectionError`.
    fn execute(&mut self, command: &str, timeout: Duration) -> Result<CommandResult, PanelError>;

    /// Close the session. Errors are logged, not returned.
    fn close(self: Box<Self>);
}
