//! Settings file management

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PanelError;
use crate::logs::LogLevel;
use crate::storage::layout::StorageLayout;

/// Environment variable holding the vault master secret
pub const MASTER_SECRET_ENV: &str = "REPODECK_SECRET";
/// Fallback master secret variable shared with the chat front-end
pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
/// Shared secret GitHub signs webhook deliveries with
pub const WEBHOOK_SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";

const DEV_MASTER_SECRET: &str = "repodeck-development-secret";

/// Panel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub github: GithubSettings,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub deploy: DeploySettings,
}

impl Settings {
    /// Read `settings.json`; a missing file yields defaults
    pub async fn load(layout: &StorageLayout) -> Result<Self, PanelError> {
        let settings = layout.settings_file().read_json_opt::<Settings>().await?;
        Ok(settings.unwrap_or_default())
    }
}

/// Control API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Externally reachable base URL, used as the webhook target
    #[serde(default)]
    pub public_url: Option<String>,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            public_url: None,
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default = "default_api_base")]
    pub api_base_url: String,

    /// Host clone URLs are built against
    #[serde(default = "default_web_base")]
    pub web_base_url: String,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_web_base() -> String {
    "https://github.com".to_string()
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_capacity() -> usize {
    512
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base(),
            web_base_url: default_web_base(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// SSH timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// Deploy conversation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Commits are authored as `<github login>@<domain>`
    #[serde(default = "default_email_domain")]
    pub commit_email_domain: String,

    /// Sessions without input for this long are dropped
    #[serde(default = "default_idle_ttl")]
    pub session_idle_ttl_secs: u64,

    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_secs: u64,
}

fn default_email_domain() -> String {
    "users.noreply.github.com".to_string()
}

fn default_idle_ttl() -> u64 {
    30 * 60
}

fn default_janitor_interval() -> u64 {
    60
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            commit_email_domain: default_email_domain(),
            session_idle_ttl_secs: default_idle_ttl(),
            janitor_interval_secs: default_janitor_interval(),
        }
    }
}

/// Secrets read from the environment, never from `settings.json`
pub struct Secrets {
    pub master: SecretString,
    pub webhook: Option<SecretString>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve secrets through `lookup`; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let master = match get(MASTER_SECRET_ENV).or_else(|| get(BOT_TOKEN_ENV)) {
            Some(value) => value,
            None => {
                warn!(
                    "Neither {} nor {} is set; using the development master secret",
                    MASTER_SECRET_ENV, BOT_TOKEN_ENV
                );
                DEV_MASTER_SECRET.to_string()
            }
        };

        Self {
            master: SecretString::from(master),
            webhook: get(WEBHOOK_SECRET_ENV).map(SecretString::from),
        }
    }
}
