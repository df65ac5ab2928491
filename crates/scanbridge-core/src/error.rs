//! # Error Types
//!
//! Domain-specific error types for scanbridge-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  scanbridge-core errors (this file)                                    │
//! │  └── CoreError        - Pairing/record/policy domain failures          │
//! │                                                                         │
//! │  scanbridge-engine errors (separate crate)                             │
//! │  └── BridgeError      - Network, filesystem, session failures          │
//! │                                                                         │
//! │  Flow: CoreError → BridgeError → command surface → presentation        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, reason)
//! 3. Errors are enum variants, never String

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A field does not match its expected format.
    #[error("invalid {field}: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A structured pairing payload declares a schema version this
    /// build does not understand.
    #[error("unsupported pairing payload version {0}")]
    UnsupportedPayloadVersion(u32),

    /// A pairing code is neither a structured payload nor a manual code.
    #[error("unrecognized pairing code format")]
    UnrecognizedPairingCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = CoreError::InvalidFormat {
            field: "server_url".into(),
            reason: "missing scheme".into(),
        };
        assert!(err.to_string().contains("server_url"));
        assert!(err.to_string().contains("missing scheme"));
    }
}
