//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::app::state::AppState;
use crate::deploy::orchestrator::DeployOrchestrator;
use crate::github::GithubService;
use crate::notifications::Outbox;
use crate::profiles::ProfileService;
use crate::storage::accounts::AccountStore;
use crate::storage::subscriptions::SubscriptionStore;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<DeployOrchestrator>,
    pub profiles: Arc<ProfileService>,
    pub github: Arc<GithubService>,
    pub accounts: Arc<AccountStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub outbox: Arc<Outbox>,
    pub webhook_secret: Option<SecretString>,
}

impl ServerState {
    pub fn new(app_state: &AppState) -> Self {
        Self {
            orchestrator: app_state.orchestrator.clone(),
            profiles: app_state.profiles.clone(),
            github: app_state.github.clone(),
            accounts: app_state.accounts.clone(),
            subscriptions: app_state.subscriptions.clone(),
            outbox: app_state.outbox.clone(),
            webhook_secret: app_state.webhook_secret.clone(),
        }
    }
}
