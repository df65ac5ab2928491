//! # scanbridge-engine: Bridge Engines for ScanBridge
//!
//! This crate provides the background engines that connect physical
//! network scanners to a remote document-management backend: concurrent
//! device discovery, pairing/session management, and folder
//! synchronization, composed behind one status surface.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bridge Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Bridge (Orchestrator)                       │  │
//! │  │                                                                  │  │
//! │  │  Command surface for the presentation layer                     │  │
//! │  │  status / discover / pair / disconnect / folder sync control     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ DiscoveryEngine│  │ SessionManager │  │  FolderSyncEngine      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ mDNS + WSD +   │  │ pairing code → │  │ notify watcher →       │    │
//! │  │ subnet scan,   │  │ credential,    │  │ stability gate →       │    │
//! │  │ fan-out/fan-in │  │ heartbeat      │  │ bounded queue →        │    │
//! │  │ + dedup merge  │  │ liveness       │  │ retrying uploader      │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ RemoteClient   │  │ CredentialStore│  │  StatusAggregator      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ JSON + multi-  │  │ get/set/clear  │  │ one consistent         │    │
//! │  │ part over      │  │ capability     │  │ BridgeSnapshot         │    │
//! │  │ HTTPS, bearer  │  │ (keyring)      │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  SUPPLEMENTARY:                                                        │
//! │  ┌────────────────┐                                                    │
//! │  │  JobPoller     │  fetches backend scan jobs; device access sits    │
//! │  │  (ScanExecutor │  behind the ScanExecutor trait (platform glue)    │
//! │  │   trait seam)  │                                                    │
//! │  └────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`bridge`] - `Bridge` orchestrator and event emitter seam
//! - [`config`] - TOML + env configuration
//! - [`error`] - `BridgeError` taxonomy
//! - [`discovery`] - multi-protocol discovery engine
//! - [`session`] - pairing/session manager with heartbeat liveness
//! - [`sync`] - folder sync engine (watcher, queue, upload worker)
//! - [`jobs`] - backend scan-job poller
//! - [`aggregator`] - status aggregation
//! - [`remote`] - HTTPS client for the backend API
//! - [`credentials`] - secure credential store capability
//! - [`protocol`] - JSON wire types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scanbridge_engine::{Bridge, BridgeConfig, KeyringStore};
//!
//! let config = BridgeConfig::load_or_default(None);
//! let bridge = Bridge::new(config, Arc::new(KeyringStore::new()));
//!
//! // Reconnect with a stored credential, if any.
//! bridge.startup().await?;
//!
//! // Pair, discover, sync.
//! bridge.pair("AB12-CD34-EF56", Some("https://docs.example.com")).await?;
//! let scanners = bridge.discover_scanners().await;
//! println!("Found {} scanners", scanners.len());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod aggregator;
pub mod bridge;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod jobs;
pub mod protocol;
pub mod remote;
pub mod session;
pub mod sync;

// =============================================================================
// Re-exports
// =============================================================================

pub use aggregator::{BridgeSnapshot, StatusAggregator};
pub use bridge::{Bridge, BridgeEventEmitter, NoOpEmitter};
pub use config::{BridgeConfig, DiscoverySettings, HeartbeatSettings, SyncSettings};
pub use credentials::{CredentialStore, KeyringStore, MemoryStore, StoredCredential};
pub use discovery::{DiscoveryEngine, DiscoveryStats};
pub use error::{BridgeError, BridgeResult};
pub use jobs::{JobPoller, PollerStatus, ScanExecutor, ScanOutput};
pub use session::{ActiveSession, SessionManager, SessionSnapshot};
pub use sync::{FolderSyncEngine, SyncPhase, SyncStatus, UploadTask};

// Re-export the core domain types consumers need alongside the engines.
pub use scanbridge_core::scanner::{DiscoveryMethod, ScanProtocol, ScannerRecord};
pub use scanbridge_core::upload::PostAction;
