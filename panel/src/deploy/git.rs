//! Local git invocations

use std::path::Path;
use std::process::{Command, Output};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::deploy::sync::ShellRunner;
use crate::errors::PanelError;
use crate::ssh::CommandResult;

/// Clone `clone_url` into `dest`, which must not exist yet.
///
/// The URL carries the access token, so it never appears in logs and is
/// scrubbed from any error text.
pub fn clone_repository(clone_url: &SecretString, dest: &Path) -> Result<(), PanelError> {
    info!("Cloning repository into {:?}", dest);

    let output = git_command()
        .args(["clone", "--quiet", "--"])
        .arg(clone_url.expose_secret())
        .arg(dest)
        .output()
        .map_err(|e| PanelError::CloneError(format!("cannot run git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PanelError::CloneError(redact_credentials(stderr.trim())));
    }

    debug!("Clone finished");
    Ok(())
}

/// Runs scripts with `sh -c` on this host
#[derive(Debug, Default)]
pub struct LocalShell;

impl ShellRunner for LocalShell {
    fn run(&mut self, script: &str) -> Result<CommandResult, PanelError> {
        debug!("Running local script: {}", redact_credentials(script));
        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok(to_result(output))
    }
}

fn git_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn to_result(output: Output) -> CommandResult {
    CommandResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

/// Replace the userinfo part of every URL in `text` with `***`
pub fn redact_credentials(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find("://") {
        let (head, tail) = rest.split_at(idx + 3);
        out.push_str(head);

        let authority_end = tail
            .find(|c: char| c == '/' || c == '\'' || c == '"' || c.is_whitespace())
            .unwrap_or(tail.len());
        let authority = &tail[..authority_end];
        match authority.rfind('@') {
            Some(at) => {
                out.push_str("***");
                out.push_str(&authority[at..]);
            }
            None => out.push_str(authority),
        }
        rest = &tail[authority_end..];
    }

    out.push_str(rest);
    out
}
