//! Application state management

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::app::options::AppOptions;
use crate::cache::response::ResponseCache;
use crate::deploy::executor::{DeployExecutor, ExecutorOptions};
use crate::deploy::orchestrator::{DeployOrchestrator, OrchestratorOptions};
use crate::errors::PanelError;
use crate::github::{GithubClient, GithubService};
use crate::notifications::Outbox;
use crate::profiles::ProfileService;
use crate::ssh::libssh::LibsshTransport;
use crate::ssh::RemoteTransport;
use crate::storage::accounts::AccountStore;
use crate::storage::profiles::{JsonProfileStore, ProfileStore};
use crate::storage::settings::Secrets;
use crate::storage::subscriptions::SubscriptionStore;
use crate::vault::Vault;

/// Main application state
pub struct AppState {
    pub orchestrator: Arc<DeployOrchestrator>,
    pub profiles: Arc<ProfileService>,
    pub github: Arc<GithubService>,
    pub accounts: Arc<AccountStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub outbox: Arc<Outbox>,
    pub cache: Arc<ResponseCache>,
    /// Secret webhook deliveries are signed with, when configured
    pub webhook_secret: Option<SecretString>,
}

impl AppState {
    /// Open the stores and wire the services, using libssh2 for SSH
    pub async fn init(options: &AppOptions, secrets: Secrets) -> Result<Self, PanelError> {
        let transport = Arc::new(LibsshTransport::new(
            options.layout.known_hosts_file().path(),
        ));
        Self::init_with_transport(options, secrets, transport).await
    }

    /// Same as [`AppState::init`] with a caller-provided transport
    pub async fn init_with_transport(
        options: &AppOptions,
        secrets: Secrets,
        transport: Arc<dyn RemoteTransport>,
    ) -> Result<Self, PanelError> {
        info!("Initializing application state...");
        let layout = &options.layout;
        layout.setup().await?;

        let vault = Arc::new(Vault::new(&secrets.master));
        let profile_store: Arc<dyn ProfileStore> =
            Arc::new(JsonProfileStore::open(layout.profiles_file()).await?);
        let accounts = Arc::new(AccountStore::open(layout.accounts_file()).await?);
        let subscriptions = Arc::new(SubscriptionStore::open(layout.subscriptions_file()).await?);

        let cache = Arc::new(ResponseCache::new(
            options.github.cache_ttl,
            options.github.cache_capacity,
        ));
        let client = Arc::new(GithubClient::new(&options.github.api_base_url, cache.clone())?);

        let executor = Arc::new(DeployExecutor::new(
            transport.clone(),
            ExecutorOptions {
                workspaces_dir: layout.workspaces_dir().path().to_path_buf(),
                connect_timeout: options.ssh.connect_timeout,
                command_timeout: options.ssh.command_timeout,
            },
        ));
        let orchestrator = Arc::new(DeployOrchestrator::new(
            profile_store.clone(),
            accounts.clone(),
            vault.clone(),
            executor,
            OrchestratorOptions {
                github_web_url: options.github.web_base_url.clone(),
                commit_email_domain: options.commit_email_domain.clone(),
            },
        ));

        let profiles = Arc::new(ProfileService::new(
            profile_store,
            vault.clone(),
            transport,
            options.ssh.connect_timeout,
        ));
        let github = Arc::new(GithubService::new(
            client,
            accounts.clone(),
            subscriptions.clone(),
            vault,
            options.server.public_url.clone(),
            secrets.webhook.clone(),
        ));

        Ok(Self {
            orchestrator,
            profiles,
            github,
            accounts,
            subscriptions,
            outbox: Arc::new(Outbox::default()),
            cache,
            webhook_secret: secrets.webhook,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PanelError> {
        info!("Shutting down application state...");
        self.cache.clear();
        Ok(())
    }
}
