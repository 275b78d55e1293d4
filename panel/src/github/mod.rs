//! GitHub REST access

pub mod client;
pub mod service;
pub mod webhook;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::errors::PanelError;

pub use client::{BranchHead, FileEdit, GithubClient, HookStatus, RepoPage};
pub use service::{GithubService, NewRepo, RepoContents, RepoDetails, Subscription};

/// Username GitHub expects when a token is used as a password
const TOKEN_USERNAME: &str = "x-access-token";

/// `https://x-access-token:<token>@github.com/<owner>/<repo>.git`
///
/// A `file:` base names a local mirror and gets no credentials.
pub fn authenticated_clone_url(
    web_base: &str,
    owner: &str,
    repo: &str,
    token: &SecretString,
) -> Result<SecretString, PanelError> {
    validate_repo_name(owner, repo)?;

    let mut url = Url::parse(web_base)
        .map_err(|e| PanelError::ConfigError(format!("invalid GitHub URL {}: {}", web_base, e)))?;
    url.path_segments_mut()
        .map_err(|_| PanelError::ConfigError(format!("invalid GitHub URL {}", web_base)))?
        .pop_if_empty()
        .push(owner)
        .push(&format!("{}.git", repo));
    if url.scheme() == "file" {
        return Ok(SecretString::from(String::from(url)));
    }
    url.set_username(TOKEN_USERNAME)
        .and_then(|_| url.set_password(Some(token.expose_secret())))
        .map_err(|_| PanelError::ConfigError(format!("cannot embed credentials in {}", web_base)))?;

    Ok(SecretString::from(String::from(url)))
}

/// Owner and repository names: ASCII letters, digits, `-`, `_` and `.`
pub fn validate_repo_name(owner: &str, repo: &str) -> Result<(), PanelError> {
    if valid_name(owner) && valid_name(repo) {
        Ok(())
    } else {
        Err(PanelError::ValidationError(format!(
            "invalid repository name: {}/{}",
            owner, repo
        )))
    }
}

/// A name for a new or renamed repository
pub fn validate_new_name(name: &str) -> Result<(), PanelError> {
    if valid_name(name) && name.len() <= 100 {
        Ok(())
    } else {
        Err(PanelError::ValidationError(format!(
            "invalid repository name: {}",
            name
        )))
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Path inside a repository, without leading or trailing slashes.
///
/// Empty means the root. `.`/`..` segments and characters that would end
/// the URL path are rejected.
pub fn normalize_content_path(raw: &str) -> Result<String, PanelError> {
    let path = raw.trim().trim_matches('/');
    let invalid = path.split('/').any(|segment| {
        (segment.is_empty() && !path.is_empty())
            || segment == "."
            || segment == ".."
            || segment
                .chars()
                .any(|c| c.is_control() || matches!(c, '?' | '#' | '%' | '\\'))
    });
    if invalid {
        return Err(PanelError::ValidationError(format!(
            "invalid path: {}",
            raw
        )));
    }
    Ok(path.to_string())
}
