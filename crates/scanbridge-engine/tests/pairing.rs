//! Pairing flow against the scripted backend.

mod common;

use std::sync::Arc;

use scanbridge_engine::config::HeartbeatSettings;
use scanbridge_engine::credentials::{CredentialStore, MemoryStore};
use scanbridge_engine::error::BridgeError;
use scanbridge_engine::session::SessionManager;

use common::{spawn_backend, structured_code, BackendState};

fn manager(store: Arc<MemoryStore>) -> SessionManager {
    SessionManager::new("Test Bridge", HeartbeatSettings::default(), store)
}

#[tokio::test]
async fn manual_code_pairs_and_keeps_caller_url() {
    // The backend echoes a server URL without the port, as a reverse
    // proxy would; the caller's URL must win.
    let backend = spawn_backend(BackendState {
        resolve_echo_url: Some("http://127.0.0.1".to_string()),
        ..BackendState::default()
    });

    let store = Arc::new(MemoryStore::new());
    let session = manager(store.clone());

    let status = session
        .pair("AB12-CD34-EF56", Some(&backend.url))
        .await
        .unwrap();

    assert!(status.connected);
    assert_eq!(status.server_url.as_deref(), Some(backend.url.as_str()));
    assert_eq!(status.bridge_id.as_deref(), Some("bridge-1"));

    // The stored credential carries the caller's URL, not the echo.
    let stored = store.get().await.unwrap().expect("credential persisted");
    assert_eq!(stored.server_url, backend.url);
    assert_eq!(stored.api_key, "key-1");

    let state = backend.state.lock().unwrap();
    assert_eq!(state.resolves, 1);
    assert_eq!(state.registers, 1);
}

#[tokio::test]
async fn structured_code_ignores_supplied_url() {
    let backend = spawn_backend(BackendState::default());

    let store = Arc::new(MemoryStore::new());
    let session = manager(store.clone());

    // The supplied URL points nowhere; pairing succeeds anyway because a
    // structured payload carries its own server URL.
    let code = structured_code(&backend.url);
    let status = session
        .pair(&code, Some("http://127.0.0.1:1"))
        .await
        .unwrap();

    assert!(status.connected);
    assert_eq!(status.server_url.as_deref(), Some(backend.url.as_str()));

    // Structured codes skip resolve-code entirely.
    let state = backend.state.lock().unwrap();
    assert_eq!(state.resolves, 0);
    assert_eq!(state.registers, 1);
}

#[tokio::test]
async fn rejected_code_leaves_no_state() {
    let backend = spawn_backend(BackendState {
        reject_resolve: true,
        ..BackendState::default()
    });

    let store = Arc::new(MemoryStore::new());
    let session = manager(store.clone());

    let err = session
        .pair("AB12-CD34-EF56", Some(&backend.url))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::RejectedCode(_)));

    // No partial state: disconnected, nothing persisted.
    assert!(!session.status().await.connected);
    assert!(store.get().await.unwrap().is_none());
}

#[tokio::test]
async fn unreachable_server_is_reported_as_such() {
    let store = Arc::new(MemoryStore::new());
    let session = manager(store.clone());

    // Nothing listens on this port.
    let err = session
        .pair("AB12-CD34-EF56", Some("http://127.0.0.1:1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnreachableServer(_)));
    assert!(!session.status().await.connected);
    assert!(store.get().await.unwrap().is_none());
}

#[tokio::test]
async fn disconnect_after_pairing_clears_store() {
    let backend = spawn_backend(BackendState::default());

    let store = Arc::new(MemoryStore::new());
    let session = manager(store.clone());

    let code = structured_code(&backend.url);
    session.pair(&code, None).await.unwrap();
    assert!(store.get().await.unwrap().is_some());

    session.disconnect().await.unwrap();
    assert!(!session.status().await.connected);
    assert!(store.get().await.unwrap().is_none());

    // Idempotent.
    session.disconnect().await.unwrap();
}
