//! # Credential Storage
//!
//! The session credential sits behind a small capability interface
//! (get/set/clear) so the secure-storage backend can vary by platform
//! without touching session logic.
//!
//! ## Backends
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CredentialStore Backends                           │
//! │                                                                         │
//! │  KeyringStore (default)                                                │
//! │  ──────────────────────                                                │
//! │  • OS keychain / Secret Service / Credential Manager                   │
//! │  • One entry holding the session as JSON                               │
//! │  • keyring calls are blocking → run on the blocking pool               │
//! │                                                                         │
//! │  MemoryStore                                                           │
//! │  ────────────                                                          │
//! │  • In-process only; for tests and headless environments                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};

/// Keyring service name for the bridge.
const KEYRING_SERVICE: &str = "scanbridge";

/// Keyring entry holding the serialized session.
const KEYRING_ENTRY: &str = "session";

// =============================================================================
// Stored Credential
// =============================================================================

/// The persisted outcome of a successful pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Backend base URL (normalized, no trailing slash).
    pub server_url: String,
    /// Opaque bearer credential.
    pub api_key: String,
    /// Bridge id assigned by the backend.
    pub bridge_id: String,
}

// =============================================================================
// Capability Interface
// =============================================================================

/// Get/set/clear semantics over the secure credential store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credential, if any.
    async fn get(&self) -> BridgeResult<Option<StoredCredential>>;

    /// Persists the credential, replacing any previous one.
    async fn set(&self, credential: &StoredCredential) -> BridgeResult<()>;

    /// Removes the stored credential. Clearing an empty store succeeds.
    async fn clear(&self) -> BridgeResult<()>;
}

// =============================================================================
// Keyring Backend
// =============================================================================

/// Credential store backed by the OS keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        KeyringStore {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    /// Uses a custom service name (isolates parallel installations).
    pub fn with_service(service: impl Into<String>) -> Self {
        KeyringStore {
            service: service.into(),
        }
    }

    fn entry(&self) -> BridgeResult<keyring::Entry> {
        keyring::Entry::new(&self.service, KEYRING_ENTRY)
            .map_err(|e| BridgeError::CredentialStore(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self) -> BridgeResult<Option<StoredCredential>> {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, KEYRING_ENTRY)
                .map_err(|e| BridgeError::CredentialStore(e.to_string()))?;
            match entry.get_password() {
                Ok(json) => {
                    let credential: StoredCredential = serde_json::from_str(&json)
                        .map_err(|e| BridgeError::CredentialStore(e.to_string()))?;
                    Ok(Some(credential))
                }
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(BridgeError::CredentialStore(e.to_string())),
            }
        })
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))?
    }

    async fn set(&self, credential: &StoredCredential) -> BridgeResult<()> {
        let json = serde_json::to_string(credential)
            .map_err(|e| BridgeError::CredentialStore(e.to_string()))?;
        let entry = self.entry()?;
        tokio::task::spawn_blocking(move || {
            entry
                .set_password(&json)
                .map_err(|e| BridgeError::CredentialStore(e.to_string()))
        })
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))??;
        debug!("Credential stored in keyring");
        Ok(())
    }

    async fn clear(&self) -> BridgeResult<()> {
        let entry = self.entry()?;
        tokio::task::spawn_blocking(move || match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(BridgeError::CredentialStore(e.to_string())),
        })
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))??;
        debug!("Credential cleared from keyring");
        Ok(())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-process credential store for tests and headless environments.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Option<StoredCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self) -> BridgeResult<Option<StoredCredential>> {
        Ok(self.inner.read().await.clone())
    }

    async fn set(&self, credential: &StoredCredential) -> BridgeResult<()> {
        *self.inner.write().await = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> BridgeResult<()> {
        *self.inner.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> StoredCredential {
        StoredCredential {
            server_url: "https://docs.example.com".into(),
            api_key: "key-1".into(),
            bridge_id: "bridge-1".into(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get().await.unwrap().is_none());

        store.set(&credential()).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(credential()));

        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_clear_is_idempotent() {
        let store = MemoryStore::new();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
    }

    #[test]
    fn test_stored_credential_serializes() {
        let json = serde_json::to_string(&credential()).unwrap();
        let parsed: StoredCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, credential());
    }
}
