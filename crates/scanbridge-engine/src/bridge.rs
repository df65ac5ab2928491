//! # Bridge Orchestrator
//!
//! Wires the engines together and exposes the command surface consumed by
//! the presentation layer.
//!
//! ## Command Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bridge Commands                                  │
//! │                                                                         │
//! │  status()                    one consistent BridgeSnapshot             │
//! │  discover_scanners()         run probes, report to backend             │
//! │  pair(code, url?)            pairing code → connected session          │
//! │  disconnect()                clear credential, stop engines            │
//! │  configure_folder_sync(...)  set watch path + post action              │
//! │  start_folder_sync()         start watcher + upload worker             │
//! │  stop_folder_sync()          cooperative stop                          │
//! │  folder_sync_status()        folder-sync state + counters              │
//! │                                                                         │
//! │  The OS folder picker (pick_folder) and all UI stay in the             │
//! │  presentation layer; it consumes these commands only.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Disconnect Ordering
//! `disconnect()` stops the folder sync engine and the job poller BEFORE
//! clearing the session. Together with the aggregator's read order this
//! guarantees a snapshot never shows a disconnected bridge with engines
//! that presume a session.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use scanbridge_core::scanner::ScannerRecord;
use scanbridge_core::upload::PostAction;

use crate::aggregator::{BridgeSnapshot, StatusAggregator};
use crate::config::BridgeConfig;
use crate::credentials::CredentialStore;
use crate::discovery::DiscoveryEngine;
use crate::error::BridgeResult;
use crate::jobs::{JobPoller, ScanExecutor};
use crate::session::SessionManager;
use crate::sync::{FolderSyncEngine, SyncStatus};

// =============================================================================
// Event Emitter
// =============================================================================

/// Push-notification seam toward the presentation layer.
pub trait BridgeEventEmitter: Send + Sync {
    /// The bridge's observable state changed.
    fn status_changed(&self, snapshot: &BridgeSnapshot);

    /// A bridge operation failed in the background.
    fn error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for tests and headless use.
pub struct NoOpEmitter;

impl BridgeEventEmitter for NoOpEmitter {
    fn status_changed(&self, _snapshot: &BridgeSnapshot) {}
    fn error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Bridge
// =============================================================================

/// The assembled scanner bridge.
pub struct Bridge {
    session: Arc<SessionManager>,
    discovery: DiscoveryEngine,
    sync: Mutex<FolderSyncEngine>,
    poller: Option<JobPoller>,
    aggregator: StatusAggregator,
    scanners: Arc<RwLock<Vec<ScannerRecord>>>,
    emitter: Arc<dyn BridgeEventEmitter>,
}

impl Bridge {
    /// Creates a bridge with no event emitter and no scan executor.
    pub fn new(config: BridgeConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_emitter(config, store, Arc::new(NoOpEmitter), None)
    }

    /// Creates a fully wired bridge.
    ///
    /// `executor` is the platform scanner-access seam; without one the
    /// scan-job poller is not assembled and backend scan jobs are left
    /// for other bridges.
    pub fn with_emitter(
        config: BridgeConfig,
        store: Arc<dyn CredentialStore>,
        emitter: Arc<dyn BridgeEventEmitter>,
        executor: Option<Arc<dyn ScanExecutor>>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(
            config.device.name.clone(),
            config.heartbeat.clone(),
            store,
        ));

        let discovery = DiscoveryEngine::new(config.discovery.clone());
        let sync_engine = FolderSyncEngine::new(config.sync.clone(), session.clone());
        let sync_status = sync_engine.status_handle();
        let scanners = Arc::new(RwLock::new(Vec::new()));

        let poller = executor
            .map(|ex| JobPoller::new(session.clone(), ex, scanners.clone()));

        let aggregator = StatusAggregator::new(
            session.clone(),
            discovery.stats_handle(),
            sync_status,
            poller.as_ref().map(|p| p.status_handle()),
        );

        Bridge {
            session,
            discovery,
            sync: Mutex::new(sync_engine),
            poller,
            aggregator,
            scanners,
            emitter,
        }
    }

    /// Restores a persisted session at startup.
    ///
    /// Returns true when a stored credential re-established the
    /// connection without re-pairing.
    pub async fn startup(&self) -> BridgeResult<bool> {
        let restored = self.session.restore().await?;
        if restored {
            if let Some(poller) = &self.poller {
                poller.start().await;
            }
            self.emit_status().await;
        }
        Ok(restored)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// One consistent snapshot of the whole bridge.
    pub async fn status(&self) -> BridgeSnapshot {
        self.aggregator.snapshot().await
    }

    /// Runs a discovery pass and returns the deduplicated scanner list.
    ///
    /// When a session is connected the result is also reported to the
    /// backend; a report failure is logged, never surfaced.
    pub async fn discover_scanners(&self) -> Vec<ScannerRecord> {
        let records = self.discovery.discover().await;

        *self.scanners.write().await = records.clone();

        if let Some(active) = self.session.current().await {
            if let Err(e) = active
                .remote
                .report_scanners(&active.api_key, &records)
                .await
            {
                warn!(error = %e, "Could not report scanners to backend");
            }
        }

        self.emit_status().await;
        records
    }

    /// Exchanges a pairing code for a connected session.
    pub async fn pair(
        &self,
        pairing_code: &str,
        server_url: Option<&str>,
    ) -> BridgeResult<BridgeSnapshot> {
        self.session.pair(pairing_code, server_url).await?;

        if let Some(poller) = &self.poller {
            poller.start().await;
        }

        let snapshot = self.emit_status().await;
        Ok(snapshot)
    }

    /// Disconnects and clears the stored credential. Idempotent.
    pub async fn disconnect(&self) -> BridgeResult<()> {
        // Engines first, session last (snapshot consistency contract).
        self.sync.lock().await.stop().await?;
        if let Some(poller) = &self.poller {
            poller.stop().await;
        }
        self.session.disconnect().await?;

        self.emit_status().await;
        Ok(())
    }

    /// Configures the folder sync engine. Rejected while it is running.
    pub async fn configure_folder_sync(
        &self,
        watch_path: &str,
        post_action: PostAction,
    ) -> BridgeResult<()> {
        self.sync
            .lock()
            .await
            .configure(watch_path, post_action)
            .await
    }

    /// Starts folder sync with the configured watch path.
    pub async fn start_folder_sync(&self) -> BridgeResult<()> {
        self.sync.lock().await.start().await?;
        info!("Folder sync started");
        self.emit_status().await;
        Ok(())
    }

    /// Stops folder sync cooperatively.
    pub async fn stop_folder_sync(&self) -> BridgeResult<()> {
        self.sync.lock().await.stop().await?;
        self.emit_status().await;
        Ok(())
    }

    /// Folder-sync state and counters.
    pub async fn folder_sync_status(&self) -> SyncStatus {
        self.sync.lock().await.status().await
    }

    async fn emit_status(&self) -> BridgeSnapshot {
        let snapshot = self.aggregator.snapshot().await;
        self.emitter.status_changed(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoverySettings;
    use crate::credentials::MemoryStore;
    use crate::error::BridgeError;

    fn offline_bridge() -> Bridge {
        // All probes disabled so discovery resolves instantly in tests.
        let config = BridgeConfig {
            discovery: DiscoverySettings {
                mdns_enabled: false,
                wsd_enabled: false,
                subnet_scan_enabled: false,
                ..DiscoverySettings::default()
            },
            ..BridgeConfig::default()
        };
        Bridge::new(config, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_fresh_bridge_is_disconnected() {
        let bridge = offline_bridge();
        let snapshot = bridge.status().await;
        assert!(!snapshot.connected);
        assert!(snapshot.server_url.is_none());
        assert_eq!(snapshot.scanner_count, 0);
        assert!(snapshot.last_discovery.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_ok() {
        let bridge = offline_bridge();
        bridge.disconnect().await.unwrap();
        bridge.disconnect().await.unwrap();
        assert!(!bridge.status().await.connected);
    }

    #[tokio::test]
    async fn test_discover_with_all_probes_disabled() {
        let bridge = offline_bridge();
        let records = bridge.discover_scanners().await;
        assert!(records.is_empty());

        // The run still stamps the discovery stats.
        let snapshot = bridge.status().await;
        assert_eq!(snapshot.scanner_count, 0);
        assert!(snapshot.last_discovery.is_some());
    }

    #[tokio::test]
    async fn test_configure_folder_sync_via_commands() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = offline_bridge();

        bridge
            .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Keep)
            .await
            .unwrap();

        let status = bridge.folder_sync_status().await;
        assert_eq!(
            status.watch_path.as_deref(),
            dir.path().to_str()
        );
        assert!(!status.running());
    }

    #[tokio::test]
    async fn test_start_folder_sync_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = offline_bridge();
        bridge
            .configure_folder_sync(dir.path().to_str().unwrap(), PostAction::Keep)
            .await
            .unwrap();

        let err = bridge.start_folder_sync().await.unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn test_startup_without_credential() {
        let bridge = offline_bridge();
        assert!(!bridge.startup().await.unwrap());
        assert!(!bridge.status().await.connected);
    }
}
