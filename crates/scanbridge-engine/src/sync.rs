//! # Folder Sync Engine
//!
//! Watches a local directory and uploads new files to the backend exactly
//! once, applying a configurable post-upload action.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Folder Sync Pipeline                                │
//! │                                                                         │
//! │  ┌──────────┐ events ┌───────────────┐  bounded   ┌─────────────────┐  │
//! │  │ Watcher  │───────►│ Stability gate│───queue───►│ Upload worker   │  │
//! │  │ (notify) │        │ (quiet window)│ (pending)  │ (retry+backoff) │  │
//! │  └──────────┘        └───────────────┘            └────────┬────────┘  │
//! │       │ initial sweep on start()                           │            │
//! │       │                                                    ▼            │
//! │       │                                      success: seen-set insert   │
//! │       │                                      + post action              │
//! │       │                                      (move / delete / keep)     │
//! │       │                                                                 │
//! │  STATE MACHINE                                                         │
//! │  Stopped → Starting → Running → Stopping → Stopped                     │
//! │                 │         │                                             │
//! │                 └─────────┴──► ErrorPaused (systemic fs failure only;  │
//! │                                 leave via configure())                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Exactly-Once Rules
//! - A path with a pending or in-flight task is never re-enqueued
//!   (`tracked` set).
//! - An uploaded file's signature (path + size + mtime) enters the
//!   seen-set, which outlives stop/start cycles, so restarting the engine
//!   never re-uploads with `post_action = keep`.
//! - Individual file failures never stop the engine; only loss of the
//!   watch path moves it to ErrorPaused.
//! - Cancellation is cooperative: the stop signal is honored between
//!   filesystem events and between retry attempts, never mid-upload.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use scanbridge_core::upload::{
    collision_free_name, FileSignature, PostAction, UploadPolicy, UPLOADED_DIR_NAME,
};

use crate::config::SyncSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::SyncStatusReport;
use crate::session::SessionManager;

/// Health-check cadence of the watcher loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Health ticks between sync-status reports to the backend.
const REPORT_EVERY_TICKS: u64 = 6;

// =============================================================================
// State Machine
// =============================================================================

/// Folder sync engine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Systemic filesystem failure; requires reconfiguration.
    ErrorPaused,
}

impl SyncPhase {
    /// True while the engine owns running tasks.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Starting | SyncPhase::Running | SyncPhase::Stopping
        )
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Stopped => write!(f, "stopped"),
            SyncPhase::Starting => write!(f, "starting"),
            SyncPhase::Running => write!(f, "running"),
            SyncPhase::Stopping => write!(f, "stopping"),
            SyncPhase::ErrorPaused => write!(f, "error_paused"),
        }
    }
}

// =============================================================================
// Engine Configuration & Status
// =============================================================================

/// Runtime configuration of the folder sync engine.
#[derive(Debug, Clone)]
pub struct FolderSyncConfig {
    pub watch_path: PathBuf,
    pub post_action: PostAction,
}

/// Observable state of the folder sync engine.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub watch_path: Option<String>,
    pub files_uploaded: u64,
    pub files_pending: u64,
    pub errors: u64,
    pub last_upload: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn running(&self) -> bool {
        self.phase == SyncPhase::Running
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            phase: SyncPhase::Stopped,
            watch_path: None,
            files_uploaded: 0,
            files_pending: 0,
            errors: 0,
            last_upload: None,
            last_error: None,
        }
    }
}

// =============================================================================
// Upload Task
// =============================================================================

/// Task lifecycle inside the upload worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Uploading,
    Done,
    Failed,
}

/// One file queued for upload. Identity is the path: the watcher never
/// creates a second task for a path that is still pending or in flight.
#[derive(Debug)]
pub struct UploadTask {
    pub path: PathBuf,
    pub discovered_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub status: TaskStatus,
    /// Signature captured after the stability gate.
    signature: FileSignature,
}

/// Outcome of processing one task.
enum TaskOutcome {
    Uploaded,
    Skipped,
    Failed,
    /// Stop requested between retry attempts; file untouched.
    Aborted,
}

// =============================================================================
// Shared Task Context
// =============================================================================

/// State shared between watcher, gates and worker.
struct SharedState {
    settings: SyncSettings,
    config: FolderSyncConfig,
    session: Arc<SessionManager>,
    status: Arc<RwLock<SyncStatus>>,
    /// Signatures of files already uploaded (engine lifetime).
    seen: Arc<Mutex<HashSet<FileSignature>>>,
    /// Paths with a pending or in-flight task.
    tracked: Arc<Mutex<HashSet<PathBuf>>>,
}

struct EngineTasks {
    watcher_shutdown: mpsc::Sender<()>,
    worker_shutdown: mpsc::Sender<()>,
    watcher_handle: JoinHandle<()>,
    worker_handle: JoinHandle<()>,
}

// =============================================================================
// Folder Sync Engine
// =============================================================================

/// Owns the watcher/worker pair and the engine state machine.
pub struct FolderSyncEngine {
    settings: SyncSettings,
    session: Arc<SessionManager>,
    config: Option<FolderSyncConfig>,
    status: Arc<RwLock<SyncStatus>>,
    seen: Arc<Mutex<HashSet<FileSignature>>>,
    tasks: Option<EngineTasks>,
}

impl FolderSyncEngine {
    pub fn new(settings: SyncSettings, session: Arc<SessionManager>) -> Self {
        FolderSyncEngine {
            settings,
            session,
            config: None,
            status: Arc::new(RwLock::new(SyncStatus::default())),
            seen: Arc::new(Mutex::new(HashSet::new())),
            tasks: None,
        }
    }

    /// Shared handle to the sync status (read by the aggregator).
    pub fn status_handle(&self) -> Arc<RwLock<SyncStatus>> {
        self.status.clone()
    }

    /// Current engine status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    // =========================================================================
    // configure()
    // =========================================================================

    /// Sets the watch path and post action. Rejected while the engine is
    /// active; resets counters and clears any ErrorPaused condition.
    pub async fn configure(
        &mut self,
        watch_path: impl Into<PathBuf>,
        post_action: PostAction,
    ) -> BridgeResult<()> {
        if self.status.read().await.phase.is_active() {
            return Err(BridgeError::EngineRunning);
        }

        // Join any tasks left over from an ErrorPaused run.
        self.join_tasks().await;

        let watch_path = watch_path.into();
        validate_watch_path(&watch_path).await?;

        self.config = Some(FolderSyncConfig {
            watch_path: watch_path.clone(),
            post_action,
        });

        let mut status = self.status.write().await;
        *status = SyncStatus {
            watch_path: Some(watch_path.display().to_string()),
            ..SyncStatus::default()
        };

        info!(path = %watch_path.display(), %post_action, "Folder sync configured");
        Ok(())
    }

    // =========================================================================
    // start()
    // =========================================================================

    /// Starts the watcher and upload worker.
    pub async fn start(&mut self) -> BridgeResult<()> {
        let phase = self.status.read().await.phase;
        if phase.is_active() {
            return Err(BridgeError::EngineRunning);
        }
        if phase == SyncPhase::ErrorPaused {
            return Err(BridgeError::FilesystemLost(
                "folder sync is paused after a filesystem failure; reconfigure first".into(),
            ));
        }

        let config = self
            .config
            .clone()
            .ok_or_else(|| BridgeError::InvalidPath("folder sync is not configured".into()))?;

        if self.session.current().await.is_none() {
            return Err(BridgeError::NotConnected);
        }

        self.status.write().await.phase = SyncPhase::Starting;

        let shared = Arc::new(SharedState {
            settings: self.settings.clone(),
            config,
            session: self.session.clone(),
            status: self.status.clone(),
            seen: self.seen.clone(),
            tracked: Arc::new(Mutex::new(HashSet::new())),
        });

        let (queue_tx, queue_rx) = mpsc::channel::<UploadTask>(self.settings.queue_capacity);
        let (watcher_shutdown_tx, watcher_shutdown_rx) = mpsc::channel::<()>(1);
        let (worker_shutdown_tx, worker_shutdown_rx) = mpsc::channel::<()>(1);

        let watcher_handle = tokio::spawn(run_watcher(
            shared.clone(),
            queue_tx,
            watcher_shutdown_rx,
            worker_shutdown_tx.clone(),
        ));
        let worker_handle = tokio::spawn(run_worker(shared, queue_rx, worker_shutdown_rx));

        self.tasks = Some(EngineTasks {
            watcher_shutdown: watcher_shutdown_tx,
            worker_shutdown: worker_shutdown_tx,
            watcher_handle,
            worker_handle,
        });

        Ok(())
    }

    // =========================================================================
    // stop()
    // =========================================================================

    /// Stops the engine cooperatively.
    ///
    /// The watcher halts immediately; the worker finishes its in-flight
    /// upload to a definite outcome before the engine transitions to
    /// Stopped. Stopping a stopped engine is a no-op success.
    pub async fn stop(&mut self) -> BridgeResult<()> {
        if self.tasks.is_none() {
            return Ok(());
        }

        {
            let mut status = self.status.write().await;
            if status.phase == SyncPhase::Running || status.phase == SyncPhase::Starting {
                status.phase = SyncPhase::Stopping;
            }
        }

        self.join_tasks().await;

        {
            let mut status = self.status.write().await;
            // ErrorPaused survives stop(); everything else lands on Stopped.
            if status.phase != SyncPhase::ErrorPaused {
                status.phase = SyncPhase::Stopped;
            }
            status.files_pending = 0;
        }

        info!("Folder sync stopped");
        Ok(())
    }

    async fn join_tasks(&mut self) {
        let Some(tasks) = self.tasks.take() else {
            return;
        };
        let _ = tasks.watcher_shutdown.send(()).await;
        let _ = tasks.worker_shutdown.send(()).await;
        let _ = tasks.watcher_handle.await;
        let _ = tasks.worker_handle.await;
    }
}

/// Validates that the watch path is an existing, readable, writable
/// directory.
async fn validate_watch_path(path: &Path) -> BridgeResult<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| BridgeError::InvalidPath(format!("{}: {}", path.display(), e)))?;

    if !metadata.is_dir() {
        return Err(BridgeError::InvalidPath(format!(
            "{} is not a directory",
            path.display()
        )));
    }

    if metadata.permissions().readonly() {
        return Err(BridgeError::InvalidPath(format!(
            "{} is not writable",
            path.display()
        )));
    }

    // Readability: opening the directory for listing must succeed.
    tokio::fs::read_dir(path)
        .await
        .map_err(|e| BridgeError::InvalidPath(format!("{} is not readable: {}", path.display(), e)))?;

    Ok(())
}

// =============================================================================
// Watcher Task
// =============================================================================

async fn run_watcher(
    shared: Arc<SharedState>,
    queue_tx: mpsc::Sender<UploadTask>,
    mut shutdown_rx: mpsc::Receiver<()>,
    worker_shutdown: mpsc::Sender<()>,
) {
    let watch_path = shared.config.watch_path.clone();

    // Bridge notify's callback thread into the async world.
    let (fs_tx, mut fs_rx) = mpsc::channel::<notify::Result<notify::Event>>(256);
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = fs_tx.blocking_send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            error_pause(&shared, &worker_shutdown, format!("watcher init failed: {}", e)).await;
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_path, RecursiveMode::NonRecursive) {
        error_pause(&shared, &worker_shutdown, format!("watch failed: {}", e)).await;
        return;
    }

    shared.status.write().await.phase = SyncPhase::Running;
    info!(path = %watch_path.display(), "Folder sync running");

    // Pick up files that already sit in the directory.
    if let Err(e) = initial_sweep(&shared, &queue_tx).await {
        error_pause(&shared, &worker_shutdown, e.to_string()).await;
        return;
    }

    let mut health = interval(HEALTH_CHECK_INTERVAL);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Watcher shutting down");
                break;
            }

            event = fs_rx.recv() => {
                match event {
                    Some(Ok(event)) => {
                        for path in event.paths {
                            consider_candidate(&shared, &queue_tx, path).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Filesystem watch event error");
                    }
                    None => {
                        // Watcher backend went away.
                        error_pause(&shared, &worker_shutdown, "watch event stream closed".into())
                            .await;
                        return;
                    }
                }
            }

            _ = health.tick() => {
                // Losing the watch path is systemic, not per-file.
                if tokio::fs::metadata(&watch_path).await.is_err() {
                    error_pause(
                        &shared,
                        &worker_shutdown,
                        format!("watch path no longer accessible: {}", watch_path.display()),
                    )
                    .await;
                    return;
                }

                ticks += 1;
                if ticks % REPORT_EVERY_TICKS == 0 {
                    report_sync_status(&shared).await;
                }
            }
        }
    }

    drop(watcher);
    report_sync_status(&shared).await;
}

/// Enqueues all qualifying files already present in the watch directory.
async fn initial_sweep(
    shared: &Arc<SharedState>,
    queue_tx: &mpsc::Sender<UploadTask>,
) -> BridgeResult<()> {
    let mut entries = tokio::fs::read_dir(&shared.config.watch_path)
        .await
        .map_err(|e| BridgeError::FilesystemLost(format!("watch path unreadable: {}", e)))?;

    while let Ok(Some(entry)) = entries.next_entry().await {
        consider_candidate(shared, queue_tx, entry.path()).await;
    }

    Ok(())
}

/// Filters a path and, if it qualifies, spawns its stability gate.
async fn consider_candidate(
    shared: &Arc<SharedState>,
    queue_tx: &mpsc::Sender<UploadTask>,
    path: PathBuf,
) {
    if !UploadPolicy::is_allowed_extension(&path) || UploadPolicy::is_in_uploaded_dir(&path) {
        return;
    }

    // Duplicate-task prevention: one task per path at a time.
    {
        let mut tracked = shared.tracked.lock().await;
        if !tracked.insert(path.clone()) {
            return;
        }
    }

    let shared = shared.clone();
    let queue_tx = queue_tx.clone();
    tokio::spawn(async move {
        match wait_for_stable(&path, &shared.settings).await {
            Some((size, modified)) => {
                let signature = FileSignature::new(path.clone(), size, modified);

                // Already uploaded (same path+size+mtime)? Never re-enqueue.
                if shared.seen.lock().await.contains(&signature) {
                    debug!(path = %path.display(), "Skipping already-uploaded file");
                    shared.tracked.lock().await.remove(&path);
                    return;
                }

                let task = UploadTask {
                    path: path.clone(),
                    discovered_at: Utc::now(),
                    attempt_count: 0,
                    status: TaskStatus::Pending,
                    signature,
                };

                shared.status.write().await.files_pending += 1;
                if queue_tx.send(task).await.is_err() {
                    // Worker is gone (engine stopping); drop the claim so
                    // a later start() re-enqueues the file.
                    let mut status = shared.status.write().await;
                    status.files_pending = status.files_pending.saturating_sub(1);
                    drop(status);
                    shared.tracked.lock().await.remove(&path);
                }
            }
            None => {
                debug!(path = %path.display(), "File never stabilized, dropping candidate");
                shared.tracked.lock().await.remove(&path);
            }
        }
    });
}

/// Waits until a file's size stays unchanged across the configured quiet
/// window, preventing upload of a scan still being written.
///
/// Returns the stable size and mtime, or None when the file vanished or
/// kept changing.
async fn wait_for_stable(path: &Path, settings: &SyncSettings) -> Option<(u64, SystemTime)> {
    let checks = settings.quiet_checks.max(2);
    let mut last_size: Option<u64> = None;
    let mut stable_pairs = 0u32;

    // checks samples → checks-1 consecutive equal pairs required.
    for _ in 0..checks * 3 {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        let size = metadata.len();

        if last_size == Some(size) {
            stable_pairs += 1;
            if size > 0 && stable_pairs >= checks - 1 {
                let modified = metadata.modified().ok()?;
                return Some((size, modified));
            }
        } else {
            stable_pairs = 0;
        }
        last_size = Some(size);

        sleep(settings.quiet_window()).await;
    }

    None
}

/// Moves the engine into ErrorPaused and stops the worker.
async fn error_pause(shared: &Arc<SharedState>, worker_shutdown: &mpsc::Sender<()>, reason: String) {
    error!(reason = %reason, "Folder sync paused on systemic failure");
    {
        let mut status = shared.status.write().await;
        status.phase = SyncPhase::ErrorPaused;
        status.errors += 1;
        status.last_error = Some(reason);
    }
    let _ = worker_shutdown.send(()).await;
}

/// Best-effort counters report to the backend.
async fn report_sync_status(shared: &Arc<SharedState>) {
    let Some(session) = shared.session.current().await else {
        return;
    };

    let status = shared.status.read().await.clone();
    let report = SyncStatusReport {
        folder_sync_enabled: status.phase == SyncPhase::Running,
        watched_folder: status.watch_path.clone(),
        files_uploaded: status.files_uploaded,
        errors: status.errors,
        last_sync_at: status.last_upload.map(|t| t.to_rfc3339()),
    };

    if let Err(e) = session
        .remote
        .report_sync_status(&session.api_key, &report)
        .await
    {
        debug!(error = %e, "Sync status report failed");
    }
}

// =============================================================================
// Upload Worker
// =============================================================================

async fn run_worker(
    shared: Arc<SharedState>,
    mut queue_rx: mpsc::Receiver<UploadTask>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    debug!("Upload worker starting");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Upload worker shutting down");
                break;
            }

            task = queue_rx.recv() => {
                let Some(mut task) = task else { break };
                {
                    let mut status = shared.status.write().await;
                    status.files_pending = status.files_pending.saturating_sub(1);
                }

                let outcome = process_task(&shared, &mut task, &mut shutdown_rx).await;
                shared.tracked.lock().await.remove(&task.path);

                if matches!(outcome, TaskOutcome::Aborted) {
                    debug!(path = %task.path.display(), "Upload aborted by stop request");
                    break;
                }
            }
        }
    }

    debug!("Upload worker stopped");
}

/// Runs one task to a definite outcome.
async fn process_task(
    shared: &Arc<SharedState>,
    task: &mut UploadTask,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> TaskOutcome {
    // The credential is captured once, before the upload starts. A
    // concurrent disconnect() cannot half-invalidate this task.
    let Some(session) = shared.session.current().await else {
        record_failure(shared, task, "no active session").await;
        return TaskOutcome::Failed;
    };

    // A signature that entered the seen-set since enqueueing means the
    // content is already on the server; just tidy up the source file.
    if shared.seen.lock().await.contains(&task.signature) {
        if let Err(e) = apply_post_action(shared, &task.path).await {
            warn!(path = %task.path.display(), error = %e, "Post action failed for duplicate");
        }
        task.status = TaskStatus::Done;
        return TaskOutcome::Skipped;
    }

    if let Err(e) = UploadPolicy::check_size(&task.path, task.signature.size) {
        record_failure(shared, task, &e.to_string()).await;
        return TaskOutcome::Failed;
    }

    let upload_timeout = Duration::from_secs(shared.settings.upload_timeout_secs);
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(shared.settings.initial_backoff_ms),
        max_interval: Duration::from_secs(shared.settings.max_backoff_secs),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };

    loop {
        task.attempt_count += 1;
        task.status = TaskStatus::Uploading;
        debug!(
            path = %task.path.display(),
            attempt = task.attempt_count,
            "Uploading file"
        );

        match session
            .remote
            .upload_document(&session.api_key, &task.path, upload_timeout)
            .await
        {
            Ok(response) => {
                if response.duplicate {
                    debug!(path = %task.path.display(), job_id = response.job_id,
                        "Backend reported duplicate content");
                } else {
                    info!(path = %task.path.display(), job_id = response.job_id, "File uploaded");
                }

                shared.seen.lock().await.insert(task.signature.clone());
                {
                    let mut status = shared.status.write().await;
                    status.files_uploaded += 1;
                    status.last_upload = Some(Utc::now());
                }

                if let Err(e) = apply_post_action(shared, &task.path).await {
                    warn!(path = %task.path.display(), error = %e, "Post action failed");
                    let mut status = shared.status.write().await;
                    status.errors += 1;
                    status.last_error = Some(e.to_string());
                }

                task.status = TaskStatus::Done;
                return TaskOutcome::Uploaded;
            }

            Err(e) if e.is_retryable() && task.attempt_count < shared.settings.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or_else(|| Duration::from_secs(1));
                warn!(
                    path = %task.path.display(),
                    attempt = task.attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Upload failed, retrying"
                );

                // Stop signal is honored between attempts, never
                // mid-upload. The file stays untouched for a later run.
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        task.status = TaskStatus::Pending;
                        return TaskOutcome::Aborted;
                    }
                }
            }

            Err(e) => {
                // Retries exhausted or a non-retryable failure: the file
                // is left in place with no post action so an operator can
                // retry manually.
                record_failure(shared, task, &e.to_string()).await;
                return TaskOutcome::Failed;
            }
        }
    }
}

async fn record_failure(shared: &Arc<SharedState>, task: &mut UploadTask, reason: &str) {
    error!(path = %task.path.display(), attempts = task.attempt_count, reason, "Upload failed");
    task.status = TaskStatus::Failed;
    let mut status = shared.status.write().await;
    status.errors += 1;
    status.last_error = Some(format!("{}: {}", task.path.display(), reason));
}

/// Applies the configured post-upload action to a source file.
async fn apply_post_action(shared: &Arc<SharedState>, path: &Path) -> BridgeResult<()> {
    match shared.config.post_action {
        PostAction::Move => {
            let parent = path.parent().unwrap_or(Path::new("."));
            let uploaded_dir = parent.join(UPLOADED_DIR_NAME);
            tokio::fs::create_dir_all(&uploaded_dir)
                .await
                .map_err(|e| BridgeError::FileOperation {
                    path: uploaded_dir.display().to_string(),
                    reason: e.to_string(),
                })?;

            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let dest_name =
                collision_free_name(&file_name, |candidate| uploaded_dir.join(candidate).exists());
            let dest = uploaded_dir.join(dest_name);

            tokio::fs::rename(path, &dest)
                .await
                .map_err(|e| BridgeError::FileOperation {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            debug!(from = %path.display(), to = %dest.display(), "Moved uploaded file");
        }
        PostAction::Delete => {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| BridgeError::FileOperation {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            debug!(path = %path.display(), "Deleted uploaded file");
        }
        PostAction::Keep => {}
    }
    Ok(())
}
