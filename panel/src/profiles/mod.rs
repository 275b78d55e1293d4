//! Server profile registration

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::errors::PanelError;
use crate::ssh::{RemoteTransport, SshTarget};
use crate::storage::profiles::{AuthKind, ProfileStore, ServerProfile};
use crate::storage::UserId;
use crate::vault::Vault;
use crate::workers::blocking::run_blocking;

/// Credentials submitted by the user
pub struct ServerRegistration {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl ServerRegistration {
    fn validate(&self) -> Result<(), PanelError> {
        if self.host.trim().is_empty() || self.host.chars().any(char::is_whitespace) {
            return Err(PanelError::ValidationError("host is required".to_string()));
        }
        if self.port == 0 {
            return Err(PanelError::ValidationError("port must be between 1 and 65535".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(PanelError::ValidationError("username is required".to_string()));
        }
        if self.password.expose_secret().is_empty() {
            return Err(PanelError::ValidationError("password is required".to_string()));
        }
        Ok(())
    }

    fn target(&self) -> SshTarget {
        SshTarget {
            host: self.host.trim().to_string(),
            port: self.port,
            username: self.username.trim().to_string(),
        }
    }
}

/// Verifies credentials before they are stored
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    vault: Arc<Vault>,
    transport: Arc<dyn RemoteTransport>,
    connect_timeout: Duration,
}

impl ProfileService {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        vault: Arc<Vault>,
        transport: Arc<dyn RemoteTransport>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            store,
            vault,
            transport,
            connect_timeout,
        }
    }

    /// Test the login, then store the profile with the password encrypted.
    ///
    /// A failed login leaves any existing profile untouched.
    pub async fn register(
        &self,
        user: UserId,
        registration: ServerRegistration,
    ) -> Result<ServerProfile, PanelError> {
        registration.validate()?;
        let target = registration.target();

        let transport = self.transport.clone();
        let secret = registration.password.clone();
        let timeout = self.connect_timeout;
        let login_target = target.clone();
        run_blocking("ssh-verify", move || {
            let session = transport.connect(&login_target, &secret, timeout)?;
            session.close();
            Ok(())
        })
        .await?;

        let encrypted_secret = self
            .vault
            .encrypt(registration.password.expose_secret())?
            .ok_or_else(|| PanelError::ValidationError("password is required".to_string()))?;

        let profile = ServerProfile {
            host: target.host,
            port: target.port,
            username: target.username,
            auth_kind: AuthKind::Password,
            encrypted_secret,
        };
        self.store.upsert_profile(user, profile.clone()).await?;

        info!("Stored server profile {}@{}:{} for user {}", profile.username, profile.host, profile.port, user);
        Ok(profile)
    }

    pub async fn get(&self, user: UserId) -> Result<Option<ServerProfile>, PanelError> {
        self.store.get_profile(user).await
    }

    /// Returns whether a profile existed
    pub async fn remove(&self, user: UserId) -> Result<bool, PanelError> {
        let removed = self.store.delete_profile(user).await?;
        if removed {
            info!("Removed server profile for user {}", user);
        }
        Ok(removed)
    }
}
