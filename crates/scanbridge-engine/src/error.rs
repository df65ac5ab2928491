//! # Bridge Error Types
//!
//! Error types for the bridge engines.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │ InputValidation │  │    Pairing      │  │     Network             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ InvalidCode...  │  │  RejectedCode   │  │  RequestFailed          │ │
//! │  │ InvalidUrl      │  │  Unreachable... │  │  Timeout                │ │
//! │  │ InvalidPath     │  │                 │  │  ServerError            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Folder Sync   │  │   Credential    │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  EngineRunning  │  │  NotConnected   │  │  ChannelClosed          │ │
//! │  │  WatchFailed    │  │  CredentialStore│  │  ConfigLoad/SaveFailed  │ │
//! │  │  FilesystemLost │  │                 │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Category helpers drive behavior: validation errors surface immediately
//! with no side effects, retryable errors stay inside the engines and only
//! show up in counters, pairing errors are terminal for the pairing call
//! alone.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error type covering all engine failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    // =========================================================================
    // Input Validation (immediate, no side effects)
    // =========================================================================
    /// Pairing code is empty, malformed, or an unsupported payload version.
    #[error("Invalid pairing code: {0}")]
    InvalidCodeFormat(String),

    /// Server URL is missing or malformed.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Watch path does not exist or is not a readable/writable directory.
    #[error("Invalid watch path: {0}")]
    InvalidPath(String),

    // =========================================================================
    // Pairing (terminal for the pairing call only)
    // =========================================================================
    /// The backend declined the pairing code.
    #[error("Pairing code rejected: {0}")]
    RejectedCode(String),

    /// The backend could not be reached during pairing.
    #[error("Server unreachable: {0}")]
    UnreachableServer(String),

    // =========================================================================
    // Network / Transient
    // =========================================================================
    /// An HTTP request failed below the protocol level.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// An operation timed out.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// The backend answered with a non-success status.
    #[error("Server returned {status}: {message}")]
    ServerError { status: u16, message: String },

    // =========================================================================
    // Session / Credential
    // =========================================================================
    /// An operation requires a paired session.
    #[error("Not connected to a document-management server")]
    NotConnected,

    /// The credential store failed.
    #[error("Credential store error: {0}")]
    CredentialStore(String),

    // =========================================================================
    // Folder Sync
    // =========================================================================
    /// configure() was called while the engine is running.
    #[error("Folder sync is running; stop it before reconfiguring")]
    EngineRunning,

    /// The filesystem watcher could not be installed.
    #[error("Watch failed: {0}")]
    WatchFailed(String),

    /// Systemic filesystem failure (watch path removed or unreadable).
    #[error("Filesystem access lost: {0}")]
    FilesystemLost(String),

    /// A single file operation failed (read, move, delete).
    #[error("File operation failed for {path}: {reason}")]
    FileOperation { path: String, reason: String },

    // =========================================================================
    // Internal
    // =========================================================================
    /// Channel send/receive failed (a task went away).
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<scanbridge_core::CoreError> for BridgeError {
    fn from(err: scanbridge_core::CoreError) -> Self {
        use scanbridge_core::CoreError;
        match &err {
            CoreError::Required { field } | CoreError::InvalidFormat { field, .. }
                if field == "server_url" =>
            {
                BridgeError::InvalidUrl(err.to_string())
            }
            _ => BridgeError::InvalidCodeFormat(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::RequestFailed(format!("request timed out: {}", err))
        } else {
            BridgeError::RequestFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::RequestFailed(format!("payload did not parse: {}", err))
    }
}

impl From<notify::Error> for BridgeError {
    fn from(err: notify::Error) -> Self {
        BridgeError::WatchFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        BridgeError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BridgeError {
    /// Returns true if this error is transient and the operation can be
    /// retried (network hiccups, timeouts, 429/5xx responses).
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::RequestFailed(_) | BridgeError::Timeout(_) => true,
            BridgeError::ServerError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error is an input-validation failure that was
    /// surfaced before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidCodeFormat(_)
                | BridgeError::InvalidUrl(_)
                | BridgeError::InvalidPath(_)
        )
    }

    /// Returns true if this error terminates a pairing attempt.
    pub fn is_pairing(&self) -> bool {
        matches!(
            self,
            BridgeError::RejectedCode(_) | BridgeError::UnreachableServer(_)
        )
    }

    /// Returns true if this error must move folder sync into ErrorPaused.
    pub fn is_systemic(&self) -> bool {
        matches!(self, BridgeError::FilesystemLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BridgeError::RequestFailed("connection reset".into()).is_retryable());
        assert!(BridgeError::Timeout(30).is_retryable());
        assert!(BridgeError::ServerError {
            status: 503,
            message: "maintenance".into()
        }
        .is_retryable());
        assert!(BridgeError::ServerError {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());

        assert!(!BridgeError::ServerError {
            status: 401,
            message: "bad credential".into()
        }
        .is_retryable());
        assert!(!BridgeError::RejectedCode("expired".into()).is_retryable());
        assert!(!BridgeError::InvalidPath("/missing".into()).is_retryable());
    }

    #[test]
    fn test_validation_errors() {
        assert!(BridgeError::InvalidCodeFormat("empty".into()).is_validation());
        assert!(BridgeError::InvalidPath("/missing".into()).is_validation());
        assert!(!BridgeError::NotConnected.is_validation());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: BridgeError = scanbridge_core::CoreError::UnrecognizedPairingCode.into();
        assert!(matches!(err, BridgeError::InvalidCodeFormat(_)));

        let err: BridgeError = scanbridge_core::CoreError::InvalidFormat {
            field: "server_url".into(),
            reason: "missing scheme".into(),
        }
        .into();
        assert!(matches!(err, BridgeError::InvalidUrl(_)));
    }
}
