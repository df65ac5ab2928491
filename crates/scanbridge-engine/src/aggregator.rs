//! # Status Aggregator
//!
//! Composes the session, discovery and folder-sync surfaces into one
//! consistent snapshot for external consumers.
//!
//! ## Consistency Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Snapshot Consistency                                 │
//! │                                                                         │
//! │  The forbidden mix: connected == false together with a folder-sync     │
//! │  state that presumes an active session.                                │
//! │                                                                         │
//! │  Two orderings rule it out without a global lock:                      │
//! │                                                                         │
//! │  disconnect():   stop sync engine  ──then──►  clear session            │
//! │  snapshot():     read session      ──then──►  read sync state          │
//! │                                                                         │
//! │  If the session reads disconnected, the sync engine was already        │
//! │  stopped at an earlier instant, so the later sync read cannot show     │
//! │  it running against a session that no longer exists.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::discovery::DiscoveryStats;
use crate::jobs::PollerStatus;
use crate::session::SessionManager;
use crate::sync::SyncStatus;

// =============================================================================
// Snapshot
// =============================================================================

/// One consistent view of the whole bridge.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeSnapshot {
    pub connected: bool,
    pub server_url: Option<String>,
    pub scanner_count: usize,
    pub last_discovery: Option<DateTime<Utc>>,
    pub version: String,
    pub folder_sync: SyncStatus,
    pub poller_active: bool,
    pub jobs_processed: u64,
}

// =============================================================================
// Aggregator
// =============================================================================

/// Read-only composition of the three engines' status surfaces.
pub struct StatusAggregator {
    session: Arc<SessionManager>,
    discovery_stats: Arc<RwLock<DiscoveryStats>>,
    sync_status: Arc<RwLock<SyncStatus>>,
    poller_status: Option<Arc<RwLock<PollerStatus>>>,
}

impl StatusAggregator {
    pub fn new(
        session: Arc<SessionManager>,
        discovery_stats: Arc<RwLock<DiscoveryStats>>,
        sync_status: Arc<RwLock<SyncStatus>>,
        poller_status: Option<Arc<RwLock<PollerStatus>>>,
    ) -> Self {
        StatusAggregator {
            session,
            discovery_stats,
            sync_status,
            poller_status,
        }
    }

    /// Produces one consistent snapshot.
    ///
    /// Read order matters: session before sync (see module docs).
    pub async fn snapshot(&self) -> BridgeSnapshot {
        let session = self.session.status().await;
        let folder_sync = self.sync_status.read().await.clone();
        let discovery = self.discovery_stats.read().await.clone();

        let (poller_active, jobs_processed) = match &self.poller_status {
            Some(status) => {
                let s = status.read().await;
                (s.running, s.jobs_processed)
            }
            None => (false, 0),
        };

        BridgeSnapshot {
            connected: session.connected,
            server_url: session.server_url,
            scanner_count: discovery.scanner_count,
            last_discovery: discovery.last_discovery,
            version: env!("CARGO_PKG_VERSION").to_string(),
            folder_sync,
            poller_active,
            jobs_processed,
        }
    }
}
