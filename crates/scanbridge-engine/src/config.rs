//! # Bridge Configuration
//!
//! Configuration management for the bridge engines.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SCANBRIDGE_DEVICE_ID=abc-123                                       │
//! │     SCANBRIDGE_HEARTBEAT_SECS=10                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/scanbridge/bridge.toml (Linux)                           │
//! │     ~/Library/Application Support/com.scanbridge.bridge/bridge.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, 5s probes, 3-attempt uploads             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front Desk Bridge"
//!
//! [discovery]
//! mdns_enabled = true
//! wsd_enabled = true
//! subnet_scan_enabled = true
//! probe_timeout_secs = 5
//! overall_timeout_secs = 15
//!
//! [sync]
//! quiet_window_ms = 1500
//! quiet_checks = 3
//! queue_capacity = 64
//! max_attempts = 3
//!
//! [heartbeat]
//! interval_secs = 30
//! failure_threshold = 3
//! ```
//!
//! The folder-sync watch path and post action are NOT part of this file:
//! they are runtime engine configuration supplied through
//! `configure_folder_sync` and validated there.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this bridge installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique bridge identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable bridge name (shown in the backend's device list).
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Scanner Bridge".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Discovery Settings
// =============================================================================

/// Settings for the discovery engine's probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Enable mDNS/Zeroconf browsing.
    #[serde(default = "default_true")]
    pub mdns_enabled: bool,

    /// Enable the WS-Discovery probe/match exchange.
    #[serde(default = "default_true")]
    pub wsd_enabled: bool,

    /// Enable the active subnet scan.
    #[serde(default = "default_true")]
    pub subnet_scan_enabled: bool,

    /// Per-probe timeout (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Overall bound on a discovery run (seconds). Probes still running
    /// when this elapses are abandoned; partial results are returned.
    #[serde(default = "default_overall_timeout")]
    pub overall_timeout_secs: u64,

    /// Maximum concurrent capability queries during the subnet scan.
    #[serde(default = "default_subnet_concurrency")]
    pub subnet_concurrency: usize,

    /// Candidate ports probed during the subnet scan.
    #[serde(default = "default_subnet_ports")]
    pub subnet_ports: Vec<u16>,
}

fn default_true() -> bool {
    true
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_overall_timeout() -> u64 {
    15
}
fn default_subnet_concurrency() -> usize {
    32
}
fn default_subnet_ports() -> Vec<u16> {
    vec![80, 443, 8080]
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        DiscoverySettings {
            mdns_enabled: true,
            wsd_enabled: true,
            subnet_scan_enabled: true,
            probe_timeout_secs: default_probe_timeout(),
            overall_timeout_secs: default_overall_timeout(),
            subnet_concurrency: default_subnet_concurrency(),
            subnet_ports: default_subnet_ports(),
        }
    }
}

impl DiscoverySettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

// =============================================================================
// Folder Sync Settings
// =============================================================================

/// Settings for the folder-sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Quiet window between stability checks (milliseconds). A file's
    /// size must stay unchanged across the checks before it is enqueued.
    #[serde(default = "default_quiet_window")]
    pub quiet_window_ms: u64,

    /// Number of stability checks a candidate must pass.
    #[serde(default = "default_quiet_checks")]
    pub quiet_checks: u32,

    /// Capacity of the watcher → uploader queue (backpressure bound).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upload attempt ceiling per task.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum retry backoff (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Per-upload HTTP timeout (seconds).
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

fn default_quiet_window() -> u64 {
    1500
}
fn default_quiet_checks() -> u32 {
    3
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_upload_timeout() -> u64 {
    60
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            quiet_window_ms: default_quiet_window(),
            quiet_checks: default_quiet_checks(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl SyncSettings {
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }
}

// =============================================================================
// Heartbeat Settings
// =============================================================================

/// Settings for session liveness checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    /// Interval between heartbeats (seconds).
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: u64,

    /// Consecutive failures before `connected` flips to false. The
    /// credential is kept; only an explicit disconnect discards it.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Per-heartbeat HTTP timeout (seconds).
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_secs: u64,
}

fn default_heartbeat_interval() -> u64 {
    30
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_heartbeat_timeout() -> u64 {
    10
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        HeartbeatSettings {
            interval_secs: default_heartbeat_interval(),
            failure_threshold: default_failure_threshold(),
            timeout_secs: default_heartbeat_timeout(),
        }
    }
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Discovery engine settings.
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Folder-sync pipeline settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Session heartbeat settings.
    #[serde(default)]
    pub heartbeat: HeartbeatSettings,
}

impl BridgeConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BridgeResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| BridgeError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load bridge config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BridgeResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BridgeError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.device.id.is_empty() {
            return Err(BridgeError::Internal(
                "device id must not be empty".into(),
            ));
        }

        if self.sync.queue_capacity == 0 {
            return Err(BridgeError::Internal(
                "sync queue_capacity must be greater than 0".into(),
            ));
        }

        if self.sync.max_attempts == 0 {
            return Err(BridgeError::Internal(
                "sync max_attempts must be greater than 0".into(),
            ));
        }

        if self.discovery.overall_timeout_secs < self.discovery.probe_timeout_secs {
            return Err(BridgeError::Internal(
                "discovery overall timeout must not be shorter than the probe timeout".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("SCANBRIDGE_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("SCANBRIDGE_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(secs) = std::env::var("SCANBRIDGE_HEARTBEAT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.heartbeat.interval_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("SCANBRIDGE_DISCOVERY_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.discovery.overall_timeout_secs = s;
            }
        }

        if let Ok(attempts) = std::env::var("SCANBRIDGE_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                self.sync.max_attempts = a;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "scanbridge", "bridge")
            .map(|dirs| dirs.config_dir().join("bridge.toml"))
    }

    /// Returns the bridge device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert!(config.discovery.mdns_enabled);
        assert_eq!(config.sync.max_attempts, 3);
        assert_eq!(config.heartbeat.failure_threshold, 3);
    }

    #[test]
    fn test_config_validation() {
        let mut config = BridgeConfig::default();
        assert!(config.validate().is_ok());

        config.sync.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.sync.queue_capacity = 16;
        config.discovery.overall_timeout_secs = 1;
        config.discovery.probe_timeout_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BridgeConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[discovery]"));
        assert!(toml_str.contains("[sync]"));

        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device.id, config.device.id);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: BridgeConfig = toml::from_str(
            r#"
            [device]
            id = "bridge-1"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.device.id, "bridge-1");
        assert_eq!(parsed.sync.quiet_checks, 3);
        assert!(parsed.discovery.subnet_scan_enabled);
    }
}
