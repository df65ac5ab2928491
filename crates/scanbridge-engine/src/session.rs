//! # Pairing / Session Manager
//!
//! Exchanges a short-lived pairing code for a durable credential and
//! tracks connectivity to the document-management backend.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Session Lifecycle                                 │
//! │                                                                         │
//! │  pair(code, url?)                                                      │
//! │     │  classify code (structured payload / manual code)                │
//! │     │  manual → resolve-code against caller URL                        │
//! │     │  register bridge → credential                                    │
//! │     ▼                                                                   │
//! │  credential → secure store ──► session CONNECTED ──► heartbeat task    │
//! │                                      │                                  │
//! │          heartbeat fails N times     │     heartbeat succeeds          │
//! │                └──► connected=false ─┴──► connected=true               │
//! │                     (credential KEPT - transient outage does not       │
//! │                      force re-pairing)                                 │
//! │                                                                         │
//! │  disconnect(): stop heartbeat, drop credential from memory AND store   │
//! │  restore():    credential found in store at startup → CONNECTED        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Credential Atomicity
//! The active session lives in one `RwLock<Option<ActiveSession>>` slot.
//! Workers clone the whole session (client + credential) out of the slot
//! before starting an upload; `disconnect()` swaps in `None`. An upload
//! in flight therefore completes or fails against the credential it
//! captured - it can never observe a half-cleared credential.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use scanbridge_core::pairing::PairingInput;

use crate::config::HeartbeatSettings;
use crate::credentials::{CredentialStore, StoredCredential};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::RegisterRequest;
use crate::remote::RemoteClient;

// =============================================================================
// Session Types
// =============================================================================

/// A live, credentialed connection to one backend.
#[derive(Clone)]
pub struct ActiveSession {
    pub remote: RemoteClient,
    pub api_key: String,
    pub bridge_id: String,
}

/// Pure read of the session for status surfaces.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub server_url: Option<String>,
    pub bridge_id: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    consecutive_failures: u32,
}

// =============================================================================
// Session Manager
// =============================================================================

/// Owns the bridge credential and its liveness.
pub struct SessionManager {
    device_name: String,
    heartbeat: HeartbeatSettings,
    store: Arc<dyn CredentialStore>,
    active: Arc<RwLock<Option<ActiveSession>>>,
    state: Arc<RwLock<SessionState>>,
    heartbeat_shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl SessionManager {
    pub fn new(
        device_name: impl Into<String>,
        heartbeat: HeartbeatSettings,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        SessionManager {
            device_name: device_name.into(),
            heartbeat,
            store,
            active: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(SessionState::default())),
            heartbeat_shutdown: Mutex::new(None),
        }
    }

    /// Pure read of the session. No side effects; safe to poll.
    pub async fn status(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        let active = self.active.read().await;
        SessionSnapshot {
            connected: state.connected,
            server_url: active.as_ref().map(|a| a.remote.base_url().to_string()),
            bridge_id: active.as_ref().map(|a| a.bridge_id.clone()),
        }
    }

    /// Clones the active session out of its slot, if any.
    ///
    /// Callers starting long-running work hold this clone for the whole
    /// operation; a concurrent `disconnect()` does not affect it.
    pub async fn current(&self) -> Option<ActiveSession> {
        self.active.read().await.clone()
    }

    // =========================================================================
    // Pairing
    // =========================================================================

    /// Exchanges a pairing code for a credential and connects.
    ///
    /// A structured payload carries its own server URL; `server_url` is
    /// ignored for those. Manual codes require `server_url` and are
    /// resolved through the backend first. On any failure the session is
    /// left exactly as it was - nothing is persisted.
    pub async fn pair(
        &self,
        code: &str,
        server_url: Option<&str>,
    ) -> BridgeResult<SessionSnapshot> {
        let (remote, token, bridge_name) = match PairingInput::classify(code)? {
            PairingInput::Structured(payload) => {
                // The payload's own URL wins; a separately supplied URL
                // is ignored by design.
                let remote = RemoteClient::new(&payload.server_url)?;
                (remote, payload.token, payload.bridge_name)
            }
            PairingInput::Manual(manual) => {
                let url = server_url.ok_or_else(|| {
                    BridgeError::InvalidUrl("server URL required for manual pairing codes".into())
                })?;
                // The caller's URL keeps priority over whatever the
                // backend echoes back; a reverse proxy may have dropped
                // the port on the server side.
                let remote = RemoteClient::new(url)?;
                let resolved = remote
                    .resolve_code(&manual)
                    .await
                    .map_err(map_pairing_error)?;
                if resolved.server_url != remote.base_url() {
                    debug!(
                        echoed = %resolved.server_url,
                        using = %remote.base_url(),
                        "Backend echoed a different server URL, keeping the caller's"
                    );
                }
                (remote, resolved.token, resolved.bridge_name)
            }
        };

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());

        let request = RegisterRequest {
            pairing_token: token,
            bridge_name: bridge_name
                .unwrap_or_else(|| format!("{} on {}", self.device_name, hostname)),
            bridge_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            hostname,
        };

        let registered = remote.register(&request).await.map_err(map_pairing_error)?;

        let credential = StoredCredential {
            server_url: remote.base_url().to_string(),
            api_key: registered.api_key.clone(),
            bridge_id: registered.bridge_id.clone(),
        };
        self.store.set(&credential).await?;

        self.install(ActiveSession {
            remote,
            api_key: registered.api_key,
            bridge_id: registered.bridge_id,
        })
        .await;

        info!(
            server_url = %credential.server_url,
            bridge_id = %credential.bridge_id,
            "Paired with document-management server"
        );

        Ok(self.status().await)
    }

    /// Re-establishes the session from the credential store at startup.
    ///
    /// Returns true when a credential was found and the session is now
    /// connected (liveness is confirmed by the first heartbeat).
    pub async fn restore(&self) -> BridgeResult<bool> {
        let Some(credential) = self.store.get().await? else {
            debug!("No stored credential to restore");
            return Ok(false);
        };

        let remote = RemoteClient::new(&credential.server_url)?;
        self.install(ActiveSession {
            remote,
            api_key: credential.api_key,
            bridge_id: credential.bridge_id,
        })
        .await;

        info!(server_url = %credential.server_url, "Session restored from credential store");
        Ok(true)
    }

    /// Installs a session, replacing any previous one.
    async fn install(&self, session: ActiveSession) {
        self.stop_heartbeat().await;

        *self.active.write().await = Some(session);
        {
            let mut state = self.state.write().await;
            state.connected = true;
            state.consecutive_failures = 0;
        }

        self.spawn_heartbeat().await;
    }

    // =========================================================================
    // Disconnect
    // =========================================================================

    /// Clears the credential and returns to disconnected.
    ///
    /// Idempotent - a second call is a no-op success. In-flight uploads
    /// keep the session clone they captured and finish cleanly.
    pub async fn disconnect(&self) -> BridgeResult<()> {
        self.stop_heartbeat().await;

        let had_session = self.active.write().await.take().is_some();
        {
            let mut state = self.state.write().await;
            state.connected = false;
            state.consecutive_failures = 0;
        }

        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear stored credential");
        }

        if had_session {
            info!("Disconnected from document-management server");
        }
        Ok(())
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    async fn stop_heartbeat(&self) {
        if let Some(tx) = self.heartbeat_shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Spawns the liveness loop. Repeated failures flip `connected` to
    /// false without discarding the credential; a later success flips it
    /// back.
    async fn spawn_heartbeat(&self) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.heartbeat_shutdown.lock().await = Some(shutdown_tx);

        let active = self.active.clone();
        let state = self.state.clone();
        let settings = self.heartbeat.clone();

        tokio::spawn(async move {
            // The session was just established (or restored), so the
            // first liveness check can wait a full interval.
            let period = Duration::from_secs(settings.interval_secs.max(1));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let timeout = Duration::from_secs(settings.timeout_secs);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Heartbeat task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(session) = active.read().await.clone() else {
                            continue;
                        };

                        match session.remote.heartbeat(&session.api_key, timeout).await {
                            Ok(()) => {
                                let mut s = state.write().await;
                                if !s.connected {
                                    info!("Backend reachable again, session reconnected");
                                }
                                s.connected = true;
                                s.consecutive_failures = 0;
                            }
                            Err(e) => {
                                let mut s = state.write().await;
                                s.consecutive_failures += 1;
                                debug!(
                                    failures = s.consecutive_failures,
                                    error = %e,
                                    "Heartbeat failed"
                                );
                                if s.connected
                                    && s.consecutive_failures >= settings.failure_threshold
                                {
                                    warn!(
                                        failures = s.consecutive_failures,
                                        "Backend unreachable, marking session disconnected \
                                         (credential kept)"
                                    );
                                    s.connected = false;
                                }
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Maps transport errors of the pairing flow onto the pairing taxonomy.
fn map_pairing_error(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::RequestFailed(msg) => BridgeError::UnreachableServer(msg),
        BridgeError::Timeout(secs) => {
            BridgeError::UnreachableServer(format!("timed out after {} seconds", secs))
        }
        BridgeError::ServerError { status, message } if status < 500 => {
            BridgeError::RejectedCode(if message.is_empty() {
                format!("server declined with status {}", status)
            } else {
                message
            })
        }
        BridgeError::ServerError { status, message } => {
            BridgeError::UnreachableServer(format!("server error {}: {}", status, message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new(
            "Test Bridge",
            HeartbeatSettings::default(),
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_initial_status_disconnected() {
        let session = manager();
        let status = session.status().await;
        assert!(!status.connected);
        assert!(status.server_url.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = manager();
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert!(!session.status().await.connected);
    }

    #[tokio::test]
    async fn test_restore_without_credential() {
        let session = manager();
        assert!(!session.restore().await.unwrap());
        assert!(!session.status().await.connected);
    }

    #[tokio::test]
    async fn test_restore_with_credential_connects() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&StoredCredential {
                server_url: "https://docs.example.com".into(),
                api_key: "key-1".into(),
                bridge_id: "bridge-1".into(),
            })
            .await
            .unwrap();

        let session =
            SessionManager::new("Test Bridge", HeartbeatSettings::default(), store);
        assert!(session.restore().await.unwrap());

        let status = session.status().await;
        assert!(status.connected);
        assert_eq!(status.server_url.as_deref(), Some("https://docs.example.com"));
        assert_eq!(status.bridge_id.as_deref(), Some("bridge-1"));

        // Disconnect drops both memory and store.
        session.disconnect().await.unwrap();
        assert!(!session.status().await.connected);
        assert!(session.current().await.is_none());
    }

    #[tokio::test]
    async fn test_pair_requires_url_for_manual_codes() {
        let session = manager();
        let err = session.pair("AB12-CD34-EF56", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidUrl(_)));
        // No partial state.
        assert!(!session.status().await.connected);
    }

    #[tokio::test]
    async fn test_pair_rejects_malformed_code() {
        let session = manager();
        let err = session.pair("", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCodeFormat(_)));
        let err = session.pair("not a code", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidCodeFormat(_)));
    }

    #[test]
    fn test_map_pairing_error() {
        assert!(matches!(
            map_pairing_error(BridgeError::RequestFailed("refused".into())),
            BridgeError::UnreachableServer(_)
        ));
        assert!(matches!(
            map_pairing_error(BridgeError::ServerError {
                status: 403,
                message: "expired code".into()
            }),
            BridgeError::RejectedCode(_)
        ));
        assert!(matches!(
            map_pairing_error(BridgeError::ServerError {
                status: 502,
                message: "bad gateway".into()
            }),
            BridgeError::UnreachableServer(_)
        ));
    }
}
