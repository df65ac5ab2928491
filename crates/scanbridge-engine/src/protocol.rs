//! # Remote API Protocol
//!
//! JSON wire types for the document-management backend's bridge API.
//!
//! ## API Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Bridge ⇄ Backend API                                 │
//! │                                                                         │
//! │  POST /api/scanner/bridge/resolve-code      manual code → payload      │
//! │  POST /api/scanner/bridge/register          pairing token → credential │
//! │  GET  /api/scanner/bridge/status            heartbeat                  │
//! │  POST /api/scanner/bridge/scanners          report discovered scanners │
//! │  POST /api/scanner/bridge/folder-upload     multipart document upload  │
//! │  GET  /api/scanner/bridge/pending-scans     fetch queued scan jobs     │
//! │  POST /api/scanner/bridge/scan-upload/{id}  upload scan result         │
//! │  POST /api/scanner/bridge/folder-sync-status report sync counters      │
//! │                                                                         │
//! │  All endpoints except register/resolve-code carry the bridge           │
//! │  credential as a bearer token.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// Pairing / Registration
// =============================================================================

/// Request body for resolving a manual pairing code.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveCodeRequest {
    pub code: String,
}

/// Backend response to a resolve-code call.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveCodeResponse {
    /// Backend base URL as the server believes it to be. The
    /// caller-supplied URL wins (a reverse proxy may have dropped the
    /// port), but the field is echoed for diagnostics.
    pub server_url: String,
    /// Short-lived pairing token.
    pub token: String,
    #[serde(default)]
    pub bridge_name: Option<String>,
}

/// Registration request sent while exchanging a pairing token.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub pairing_token: String,
    pub bridge_name: String,
    pub bridge_version: String,
    pub os: String,
    pub hostname: String,
}

/// Registration result: the durable bridge credential.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub bridge_id: String,
    /// Opaque bearer credential for all subsequent calls.
    pub api_key: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

// =============================================================================
// Folder Upload
// =============================================================================

/// Backend response after a folder-upload call.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderUploadResponse {
    pub success: bool,
    pub job_id: i64,
    pub filename: String,
    /// True when the backend already had a document with this hash.
    #[serde(default)]
    pub duplicate: bool,
    #[serde(default)]
    pub message: String,
}

/// Periodic sync-state report posted to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub folder_sync_enabled: bool,
    pub watched_folder: Option<String>,
    pub files_uploaded: u64,
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<String>,
}

// =============================================================================
// Scan Jobs
// =============================================================================

/// A scan job queued on the backend, waiting for this bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingScanJob {
    pub job_id: String,
    pub scanner_id: String,
    pub resolution: u32,
    pub color_mode: String,
    pub source: String,
    pub duplex: bool,
    pub format: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Response from the pending-scans endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PendingScansResponse {
    #[serde(default)]
    pub jobs: Vec<PendingScanJob>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_serializes() {
        let req = RegisterRequest {
            pairing_token: "tok".into(),
            bridge_name: "Front Desk".into(),
            bridge_version: "0.1.0".into(),
            os: "linux".into(),
            hostname: "reception-pc".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["pairing_token"], "tok");
        assert_eq!(json["hostname"], "reception-pc");
    }

    #[test]
    fn test_upload_response_defaults() {
        let resp: FolderUploadResponse = serde_json::from_str(
            r#"{"success":true,"job_id":42,"filename":"a.pdf"}"#,
        )
        .unwrap();
        assert!(resp.success);
        assert_eq!(resp.job_id, 42);
        assert!(!resp.duplicate);
        assert!(resp.message.is_empty());
    }

    #[test]
    fn test_pending_scans_empty_body() {
        let resp: PendingScansResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.jobs.is_empty());
    }
}
