//! Folder sync pipeline against the scripted backend and a temp
//! directory.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use scanbridge_engine::config::BridgeConfig;
use scanbridge_engine::credentials::MemoryStore;
use scanbridge_engine::sync::SyncStatus;
use scanbridge_engine::{Bridge, PostAction};

use common::{spawn_backend, structured_code, BackendState, TestBackend};

/// Config tuned for fast tests: probes off, short quiet window, short
/// backoff, two upload attempts.
fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.discovery.mdns_enabled = false;
    config.discovery.wsd_enabled = false;
    config.discovery.subnet_scan_enabled = false;
    config.sync.quiet_window_ms = 40;
    config.sync.quiet_checks = 2;
    config.sync.initial_backoff_ms = 20;
    config.sync.max_backoff_secs = 1;
    config.sync.max_attempts = 2;
    config.sync.upload_timeout_secs = 10;
    config
}

async fn paired_bridge(backend: &TestBackend) -> Bridge {
    let bridge = Bridge::new(test_config(), Arc::new(MemoryStore::new()));
    bridge
        .pair(&structured_code(&backend.url), None)
        .await
        .expect("pairing against test backend");
    bridge
}

async fn wait_sync(
    bridge: &Bridge,
    what: &str,
    timeout_ms: u64,
    pred: impl Fn(&SyncStatus) -> bool,
) -> SyncStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        let status = bridge.folder_sync_status().await;
        if pred(&status) {
            return status;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}: {:?}",
            what,
            status
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn write_pdf(path: &Path, content: &[u8]) {
    std::fs::write(path, content).unwrap();
}

/// The upload counter flips before the post action runs, so filesystem
/// assertions poll briefly instead of racing it.
async fn wait_fs(what: &str, timeout_ms: u64, pred: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while !pred() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn move_action_relocates_uploaded_file() {
    let backend = spawn_backend(BackendState::default());
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("a.pdf"), b"%PDF-1.4 test document");

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Move)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();

    let status = wait_sync(&bridge, "upload", 10_000, |s| s.files_uploaded >= 1).await;
    assert_eq!(status.files_uploaded, 1);
    assert_eq!(status.errors, 0);
    assert!(status.last_upload.is_some());

    // a.pdf moved to <watch>/uploaded/a.pdf.
    let moved = dir.path().join("uploaded").join("a.pdf");
    wait_fs("move post action", 5_000, || moved.exists()).await;
    assert!(!dir.path().join("a.pdf").exists());
    assert_eq!(backend.state.lock().unwrap().uploads, 1);

    bridge.stop_folder_sync().await.unwrap();
}

#[tokio::test]
async fn watcher_picks_up_files_created_while_running() {
    let backend = spawn_backend(BackendState::default());
    let dir = tempfile::tempdir().unwrap();

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Delete)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();

    // Give the watcher a moment to install, then drop a file in.
    tokio::time::sleep(Duration::from_millis(300)).await;
    write_pdf(&dir.path().join("incoming.pdf"), b"%PDF-1.4 incoming");

    let status = wait_sync(&bridge, "upload", 10_000, |s| s.files_uploaded >= 1).await;
    assert_eq!(status.files_uploaded, 1);

    // Delete action removed the source.
    let source = dir.path().join("incoming.pdf");
    wait_fs("delete post action", 5_000, || !source.exists()).await;

    bridge.stop_folder_sync().await.unwrap();
}

#[tokio::test]
async fn keep_action_does_not_reupload_after_restart() {
    let backend = spawn_backend(BackendState::default());
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("stay.pdf"), b"%PDF-1.4 keep me");

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Keep)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();

    wait_sync(&bridge, "first upload", 10_000, |s| s.files_uploaded >= 1).await;
    assert!(dir.path().join("stay.pdf").exists());
    assert_eq!(backend.state.lock().unwrap().uploads, 1);

    // Restart the engine: the file is still there (same path, size,
    // mtime) and must not upload again.
    bridge.stop_folder_sync().await.unwrap();
    bridge.start_folder_sync().await.unwrap();

    // Long enough for sweep + stability gate + worker to run.
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(backend.state.lock().unwrap().uploads, 1);
    bridge.stop_folder_sync().await.unwrap();
}

#[tokio::test]
async fn retry_exhaustion_fails_once_and_leaves_file() {
    let backend = spawn_backend(BackendState {
        fail_all_uploads: true,
        ..BackendState::default()
    });
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("doomed.pdf"), b"%PDF-1.4 doomed");

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Move)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();

    let status = wait_sync(&bridge, "retry exhaustion", 10_000, |s| s.errors >= 1).await;

    // Exactly one error for the one file, every attempt consumed.
    assert_eq!(status.errors, 1);
    assert_eq!(status.files_uploaded, 0);
    assert!(status.last_error.is_some());
    assert_eq!(backend.state.lock().unwrap().upload_attempts, 2);
    assert_eq!(backend.state.lock().unwrap().uploads, 0);

    // The file stays untouched - no post action on failure.
    assert!(dir.path().join("doomed.pdf").exists());
    assert!(!dir.path().join("uploaded").exists());

    bridge.stop_folder_sync().await.unwrap();
}

#[tokio::test]
async fn configure_is_rejected_while_running() {
    let backend = spawn_backend(BackendState::default());
    let dir = tempfile::tempdir().unwrap();

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Keep)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();

    wait_sync(&bridge, "running", 5_000, |s| s.running()).await;

    let err = bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Delete)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        scanbridge_engine::BridgeError::EngineRunning
    ));

    bridge.stop_folder_sync().await.unwrap();

    // Allowed again once stopped.
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Delete)
        .await
        .unwrap();
}

#[tokio::test]
async fn disconnect_stops_folder_sync() {
    let backend = spawn_backend(BackendState::default());
    let dir = tempfile::tempdir().unwrap();

    let bridge = paired_bridge(&backend).await;
    bridge
        .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Keep)
        .await
        .unwrap();
    bridge.start_folder_sync().await.unwrap();
    wait_sync(&bridge, "running", 5_000, |s| s.running()).await;

    bridge.disconnect().await.unwrap();

    // Engines stopped before the session was cleared: the snapshot can
    // never pair connected=false with a running sync engine.
    let snapshot = bridge.status().await;
    assert!(!snapshot.connected);
    assert!(!snapshot.folder_sync.running());
}
