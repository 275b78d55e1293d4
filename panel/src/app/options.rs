//! Application configuration options

use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::janitor;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Control API server
    pub server: ServerOptions,

    /// GitHub access
    pub github: GithubOptions,

    /// SSH timeouts
    pub ssh: SshOptions,

    /// Committer identity domain
    pub commit_email_domain: String,

    /// Janitor worker options
    pub janitor: janitor::Options,
}

impl AppOptions {
    /// Options for `layout` with the values from `settings`
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                public_url: settings.server.public_url.clone(),
            },
            github: GithubOptions {
                api_base_url: settings.github.api_base_url.clone(),
                web_base_url: settings.github.web_base_url.clone(),
                cache_ttl: Duration::from_secs(settings.github.cache_ttl_secs),
                cache_capacity: settings.github.cache_capacity,
            },
            ssh: SshOptions {
                connect_timeout: Duration::from_secs(settings.ssh.connect_timeout_secs),
                command_timeout: Duration::from_secs(settings.ssh.command_timeout_secs),
            },
            commit_email_domain: settings.deploy.commit_email_domain.clone(),
            janitor: janitor::Options {
                interval: Duration::from_secs(settings.deploy.janitor_interval_secs.max(1)),
                idle_ttl: Duration::from_secs(settings.deploy.session_idle_ttl_secs),
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Control API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Externally reachable base URL for webhook deliveries
    pub public_url: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GithubOptions {
    pub api_base_url: String,
    pub web_base_url: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SshOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}
