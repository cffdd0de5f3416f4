//! Integration tests for session persistence between CLI invocations
//!
//! Every CLI command opens the session afresh from the configured storage,
//! so these tests open several managers in turn over one session file and
//! verify that logins, renewals and logouts carry over.

use std::sync::Arc;

use serde_json::json;
use sessionward_core::{
    CredentialPair, FileStore, LogListener, SecretStore, SessionConfig, SessionManager,
    StorageBackend,
};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn grant_envelope(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "accessToken": access,
            "refreshToken": refresh,
            "user": {"id": 7, "email": "kim@example.com", "name": "Kim", "nickname": "kimmy"}
        }
    })
}

/// Configuration for a file-backed session in a temporary directory.
fn test_config(server: &MockServer) -> (SessionConfig, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = SessionConfig {
        base_url: format!("{}/api", server.uri()),
        storage: StorageBackend::File,
        storage_path: Some(temp_dir.path().join("session.json")),
        ..Default::default()
    };
    (config, temp_dir)
}

async fn open(config: &SessionConfig) -> SessionManager {
    SessionManager::from_config(config, Arc::new(LogListener))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_login_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_envelope("T1", "R1")))
        .mount(&server)
        .await;
    let (config, _temp) = test_config(&server);

    open(&config).await.login("kim@example.com", "secret").await.unwrap();

    let session = open(&config).await;
    assert!(session.is_logged_in());
    assert_eq!(session.credentials(), Some(CredentialPair::new("T1", "R1")));
    assert_eq!(session.user().unwrap().display_name(), "kimmy");
}

#[tokio::test]
async fn test_renewal_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_envelope("T1", "R1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_envelope("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;
    let (config, _temp) = test_config(&server);

    open(&config).await.login("kim@example.com", "secret").await.unwrap();
    let token = open(&config).await.renew().await.unwrap();
    assert_eq!(token.expose(), "T2");

    let session = open(&config).await;
    assert_eq!(session.credentials(), Some(CredentialPair::new("T2", "R2")));
}

#[tokio::test]
async fn test_logout_removes_stored_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_envelope("T1", "R1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    let (config, _temp) = test_config(&server);

    open(&config).await.login("kim@example.com", "secret").await.unwrap();
    open(&config).await.logout().await.unwrap();

    assert!(!open(&config).await.is_logged_in());

    let file = FileStore::open(config.storage_path.clone().unwrap()).unwrap();
    assert!(file.get("access_token").await.unwrap().is_none());
    assert!(file.get("refresh_token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refused_renewal_removes_stored_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grant_envelope("T1", "R1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "message": "Refresh token expired"
        })))
        .mount(&server)
        .await;
    let (config, _temp) = test_config(&server);

    open(&config).await.login("kim@example.com", "secret").await.unwrap();
    assert!(open(&config).await.renew().await.is_err());

    assert!(!open(&config).await.is_logged_in());
}
