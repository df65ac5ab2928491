//! # Scan-Job Poller
//!
//! Fetches scan jobs queued on the backend and runs them against local
//! scanners.
//!
//! ## Polling Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scan-Job Poller                                   │
//! │                                                                         │
//! │   loop (while session connected):                                      │
//! │     1. GET pending-scans ──► [job, job, ...]                           │
//! │     2. For each job:                                                   │
//! │        • ScanExecutor.execute(job, discovered scanners)                │
//! │        • success → POST scan-upload/{job_id} with the result           │
//! │        • failure → POST scan-upload/{job_id} with an error report      │
//! │     3. Sleep poll interval                                             │
//! │                                                                         │
//! │   The executor is a trait seam: actual device access (eSCL, WIA,       │
//! │   SANE, ImageCaptureCore) is platform glue outside this crate.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use scanbridge_core::scanner::ScannerRecord;

use crate::error::BridgeResult;
use crate::protocol::PendingScanJob;
use crate::session::SessionManager;

/// Interval between pending-scan polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

// =============================================================================
// Executor Seam
// =============================================================================

/// A finished scan, ready for upload.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Platform scanner access behind a trait seam.
///
/// Implementations drive the actual device (eSCL over HTTP, WIA, SANE,
/// ImageCaptureCore) and are supplied by the embedding application.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    /// Runs one scan job against the given scanner list.
    async fn execute(
        &self,
        job: &PendingScanJob,
        scanners: &[ScannerRecord],
    ) -> BridgeResult<ScanOutput>;
}

// =============================================================================
// Poller Status
// =============================================================================

/// Observable poller state.
#[derive(Debug, Clone, Default)]
pub struct PollerStatus {
    pub running: bool,
    pub last_poll: Option<DateTime<Utc>>,
    pub jobs_processed: u64,
    pub last_error: Option<String>,
}

// =============================================================================
// Job Poller
// =============================================================================

/// Background poller for backend-queued scan jobs.
pub struct JobPoller {
    session: Arc<SessionManager>,
    executor: Arc<dyn ScanExecutor>,
    scanners: Arc<RwLock<Vec<ScannerRecord>>>,
    status: Arc<RwLock<PollerStatus>>,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl JobPoller {
    pub fn new(
        session: Arc<SessionManager>,
        executor: Arc<dyn ScanExecutor>,
        scanners: Arc<RwLock<Vec<ScannerRecord>>>,
    ) -> Self {
        JobPoller {
            session,
            executor,
            scanners,
            status: Arc::new(RwLock::new(PollerStatus::default())),
            shutdown: Mutex::new(None),
        }
    }

    /// Shared handle to the poller status (read by the aggregator).
    pub fn status_handle(&self) -> Arc<RwLock<PollerStatus>> {
        self.status.clone()
    }

    pub async fn status(&self) -> PollerStatus {
        self.status.read().await.clone()
    }

    /// Starts the polling loop. Starting a running poller is a no-op.
    pub async fn start(&self) {
        let mut shutdown_slot = self.shutdown.lock().await;
        if shutdown_slot.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *shutdown_slot = Some(shutdown_tx);
        drop(shutdown_slot);

        self.status.write().await.running = true;

        let session = self.session.clone();
        let executor = self.executor.clone();
        let scanners = self.scanners.clone();
        let status = self.status.clone();

        tokio::spawn(async move {
            info!("Scan-job poller started");
            let mut ticker = interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        poll_once(&session, &executor, &scanners, &status).await;
                    }
                }
            }

            status.write().await.running = false;
            info!("Scan-job poller stopped");
        });
    }

    /// Stops the polling loop. Stopping a stopped poller is a no-op.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }
        self.status.write().await.running = false;
    }
}

/// One poll cycle: fetch pending jobs and run them.
async fn poll_once(
    session: &Arc<SessionManager>,
    executor: &Arc<dyn ScanExecutor>,
    scanners: &Arc<RwLock<Vec<ScannerRecord>>>,
    status: &Arc<RwLock<PollerStatus>>,
) {
    // Credential captured once per cycle.
    let Some(active) = session.current().await else {
        return;
    };

    let jobs = match active.remote.fetch_pending_jobs(&active.api_key).await {
        Ok(jobs) => {
            let mut s = status.write().await;
            s.last_poll = Some(Utc::now());
            s.last_error = None;
            jobs
        }
        Err(e) => {
            debug!(error = %e, "Pending-scan poll failed");
            status.write().await.last_error = Some(e.to_string());
            return;
        }
    };

    for job in jobs {
        info!(job_id = %job.job_id, scanner_id = %job.scanner_id, "Executing scan job");

        let snapshot = scanners.read().await.clone();
        match executor.execute(&job, &snapshot).await {
            Ok(output) => {
                match active
                    .remote
                    .upload_scan_result(&active.api_key, &job.job_id, output.data, &output.mime_type)
                    .await
                {
                    Ok(()) => {
                        status.write().await.jobs_processed += 1;
                    }
                    Err(e) => {
                        error!(job_id = %job.job_id, error = %e, "Scan result upload failed");
                        status.write().await.last_error = Some(e.to_string());
                        let _ = active
                            .remote
                            .report_scan_failure(&active.api_key, &job.job_id, &e.to_string())
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Scan execution failed");
                status.write().await.last_error = Some(e.to_string());
                let _ = active
                    .remote
                    .report_scan_failure(&active.api_key, &job.job_id, &e.to_string())
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeartbeatSettings;
    use crate::credentials::MemoryStore;
    use crate::error::BridgeError;

    struct FailingExecutor;

    #[async_trait]
    impl ScanExecutor for FailingExecutor {
        async fn execute(
            &self,
            _job: &PendingScanJob,
            _scanners: &[ScannerRecord],
        ) -> BridgeResult<ScanOutput> {
            Err(BridgeError::Internal("no device".into()))
        }
    }

    fn poller() -> JobPoller {
        let session = Arc::new(SessionManager::new(
            "Test Bridge",
            HeartbeatSettings::default(),
            Arc::new(MemoryStore::new()),
        ));
        JobPoller::new(session, Arc::new(FailingExecutor), Arc::new(RwLock::new(vec![])))
    }

    #[tokio::test]
    async fn test_poller_start_stop() {
        let poller = poller();
        assert!(!poller.status().await.running);

        poller.start().await;
        assert!(poller.status().await.running);

        // Starting again is a no-op.
        poller.start().await;
        assert!(poller.status().await.running);

        poller.stop().await;
        assert!(!poller.status().await.running);

        // Stopping again is a no-op.
        poller.stop().await;
    }
}
