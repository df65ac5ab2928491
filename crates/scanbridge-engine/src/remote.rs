//! # Remote Client
//!
//! HTTPS client for the document-management backend's bridge API.
//!
//! ## Credential Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Credential Flow                                      │
//! │                                                                         │
//! │  The client itself is credential-free; every authenticated call        │
//! │  takes the bearer credential as an argument. Callers capture a         │
//! │  credential clone BEFORE starting long-running work (an upload in      │
//! │  flight keeps the credential it captured even if disconnect() clears   │
//! │  the session concurrently - it completes or fails cleanly, never       │
//! │  half-authenticates).                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Responses with non-success status become `ServerError { status, .. }`;
//! transport-level failures become `RequestFailed`/`Timeout`. The retry
//! decision (`is_retryable`) belongs to the callers.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use scanbridge_core::pairing::{normalize_server_url, validate_server_url};
use scanbridge_core::scanner::ScannerRecord;
use scanbridge_core::upload::UploadPolicy;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{
    FolderUploadResponse, PendingScanJob, PendingScansResponse, RegisterRequest,
    RegisterResponse, ResolveCodeRequest, ResolveCodeResponse, SyncStatusReport,
};

/// Default timeout for plain JSON calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for one backend base URL.
#[derive(Clone)]
pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteClient {
    /// Creates a client for the given backend base URL.
    ///
    /// The URL is validated and normalized (no trailing slash).
    pub fn new(server_url: &str) -> BridgeResult<Self> {
        validate_server_url(server_url)?;
        let base_url = normalize_server_url(server_url);
        // Parse once so later format! calls cannot produce bad URLs.
        Url::parse(&base_url)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(RemoteClient { base_url, client })
    }

    /// Backend base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turns a non-success response into `ServerError`.
    async fn check(response: reqwest::Response) -> BridgeResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(BridgeError::ServerError {
            status: status.as_u16(),
            message,
        })
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    /// Resolves a manual pairing code into a pairing payload.
    pub async fn resolve_code(&self, code: &str) -> BridgeResult<ResolveCodeResponse> {
        let response = self
            .client
            .post(self.url("/api/scanner/bridge/resolve-code"))
            .json(&ResolveCodeRequest { code: code.into() })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Registers this bridge, exchanging a pairing token for a credential.
    pub async fn register(&self, request: &RegisterRequest) -> BridgeResult<RegisterResponse> {
        let response = self
            .client
            .post(self.url("/api/scanner/bridge/register"))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Lightweight liveness check against the backend.
    pub async fn heartbeat(&self, credential: &str, timeout: Duration) -> BridgeResult<()> {
        let response = self
            .client
            .get(self.url("/api/scanner/bridge/status"))
            .bearer_auth(credential)
            .timeout(timeout)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Reports the scanners found by a discovery run.
    pub async fn report_scanners(
        &self,
        credential: &str,
        scanners: &[ScannerRecord],
    ) -> BridgeResult<()> {
        let response = self
            .client
            .post(self.url("/api/scanner/bridge/scanners"))
            .bearer_auth(credential)
            .json(&serde_json::json!({ "scanners": scanners }))
            .send()
            .await?;
        Self::check(response).await?;
        debug!(count = scanners.len(), "Reported scanners to backend");
        Ok(())
    }

    // =========================================================================
    // Folder Upload
    // =========================================================================

    /// Uploads one document as multipart form data.
    ///
    /// The file is re-read on every call so retries never send a stale
    /// buffer; the sha256 content hash rides along for backend-side
    /// dedup.
    pub async fn upload_document(
        &self,
        credential: &str,
        path: &Path,
        timeout: Duration,
    ) -> BridgeResult<FolderUploadResponse> {
        let data = tokio::fs::read(path).await.map_err(|e| BridgeError::FileOperation {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let file_hash = hex::encode(Sha256::digest(&data));
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let file_part = Part::bytes(data)
            .file_name(filename)
            .mime_str(UploadPolicy::mime_type(path))
            .map_err(|e| BridgeError::Internal(format!("multipart build failed: {}", e)))?;

        let form = Form::new()
            .part("file", file_part)
            .text("file_hash", file_hash)
            .text("original_path", path.display().to_string());

        let response = self
            .client
            .post(self.url("/api/scanner/bridge/folder-upload"))
            .bearer_auth(credential)
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    /// Reports folder-sync counters to the backend. Best effort.
    pub async fn report_sync_status(
        &self,
        credential: &str,
        report: &SyncStatusReport,
    ) -> BridgeResult<()> {
        let response = self
            .client
            .post(self.url("/api/scanner/bridge/folder-sync-status"))
            .bearer_auth(credential)
            .json(report)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // =========================================================================
    // Scan Jobs
    // =========================================================================

    /// Fetches scan jobs queued for this bridge.
    pub async fn fetch_pending_jobs(&self, credential: &str) -> BridgeResult<Vec<PendingScanJob>> {
        let response = self
            .client
            .get(self.url("/api/scanner/bridge/pending-scans"))
            .bearer_auth(credential)
            .send()
            .await?;
        let result: PendingScansResponse = Self::check(response).await?.json().await?;
        Ok(result.jobs)
    }

    /// Uploads a finished scan result by job id.
    pub async fn upload_scan_result(
        &self,
        credential: &str,
        job_id: &str,
        data: Vec<u8>,
        mime_type: &str,
    ) -> BridgeResult<()> {
        let file_part = Part::bytes(data)
            .file_name("scan".to_string())
            .mime_str(mime_type)
            .map_err(|e| BridgeError::Internal(format!("multipart build failed: {}", e)))?;

        let form = Form::new().part("file", file_part).text("success", "true");

        let response = self
            .client
            .post(self.url(&format!("/api/scanner/bridge/scan-upload/{}", job_id)))
            .bearer_auth(credential)
            .multipart(form)
            .timeout(Duration::from_secs(60))
            .send()
            .await?;
        Self::check(response).await?;
        debug!(job_id, "Scan result uploaded");
        Ok(())
    }

    /// Reports a failed scan job to the backend. Best effort.
    pub async fn report_scan_failure(
        &self,
        credential: &str,
        job_id: &str,
        message: &str,
    ) -> BridgeResult<()> {
        let form = Form::new()
            .text("success", "false")
            .text("error_message", message.to_string());

        let response = self
            .client
            .post(self.url(&format!("/api/scanner/bridge/scan-upload/{}", job_id)))
            .bearer_auth(credential)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_base_url() {
        let client = RemoteClient::new("https://docs.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://docs.example.com");
        assert_eq!(
            client.url("/api/scanner/bridge/status"),
            "https://docs.example.com/api/scanner/bridge/status"
        );
    }

    #[test]
    fn test_new_rejects_bad_urls() {
        assert!(RemoteClient::new("").is_err());
        assert!(RemoteClient::new("ftp://docs.example.com").is_err());
        assert!(RemoteClient::new("http://").is_err());
    }
}
