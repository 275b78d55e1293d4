//! Server profile registration

use std::sync::Arc;
use std::time::Duration;

use repodeck::errors::PanelError;
use repodeck::filesys::file::File;
use repodeck::profiles::{ProfileService, ServerRegistration};
use repodeck::storage::profiles::{AuthKind, JsonProfileStore};
use secrecy::{ExposeSecret, SecretString};
use tokio_test::{assert_err, assert_ok};

use crate::common::{git_server, vault, FakeTransport, PASSWORD};

fn registration(password: &str) -> ServerRegistration {
    ServerRegistration {
        host: " 203.0.113.7 ".to_string(),
        port: 2222,
        username: "deploy".to_string(),
        password: SecretString::from(password.to_string()),
    }
}

async fn service(dir: &std::path::Path) -> (ProfileService, Arc<FakeTransport>) {
    let store = Arc::new(
        JsonProfileStore::open(File::new(dir.join("profiles.json")))
            .await
            .unwrap(),
    );
    let transport = Arc::new(FakeTransport::new(git_server));
    let service = ProfileService::new(
        store,
        Arc::new(vault()),
        transport.clone(),
        Duration::from_secs(1),
    );
    (service, transport)
}

#[tokio::test]
async fn test_register_stores_encrypted_password() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, transport) = service(tmp.path()).await;

    let profile = assert_ok!(service.register(7, registration(PASSWORD)).await);
    assert_eq!(profile.host, "203.0.113.7");
    assert_eq!(profile.port, 2222);
    assert_eq!(profile.auth_kind, AuthKind::Password);
    assert_ne!(profile.encrypted_secret, PASSWORD);
    assert_eq!(transport.connections.lock().unwrap().len(), 1);

    let decrypted = vault().decrypt(&profile.encrypted_secret).unwrap().unwrap();
    assert_eq!(decrypted.expose_secret(), PASSWORD);

    let on_disk = std::fs::read_to_string(tmp.path().join("profiles.json")).unwrap();
    assert!(!on_disk.contains(PASSWORD));
    assert!(!format!("{:?}", profile).contains(&profile.encrypted_secret));
}

#[tokio::test]
async fn test_failed_login_keeps_previous_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _) = service(tmp.path()).await;
    assert_ok!(service.register(7, registration(PASSWORD)).await);

    let mut changed = registration("wrong");
    changed.host = "198.51.100.1".to_string();
    let err = assert_err!(service.register(7, changed).await);
    assert!(matches!(err, PanelError::ConnectionError(_)));

    let stored = service.get(7).await.unwrap().unwrap();
    assert_eq!(stored.host, "203.0.113.7");
}

#[tokio::test]
async fn test_register_validates_input() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, transport) = service(tmp.path()).await;

    let mut no_port = registration(PASSWORD);
    no_port.port = 0;
    assert!(matches!(
        service.register(7, no_port).await,
        Err(PanelError::ValidationError(_))
    ));
    assert!(matches!(
        service.register(7, registration("")).await,
        Err(PanelError::ValidationError(_))
    ));
    assert!(transport.connections.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_profile() {
    let tmp = tempfile::tempdir().unwrap();
    let (service, _) = service(tmp.path()).await;
    assert_ok!(service.register(7, registration(PASSWORD)).await);

    assert!(service.remove(7).await.unwrap());
    assert!(!service.remove(7).await.unwrap());
    assert!(service.get(7).await.unwrap().is_none());
}
