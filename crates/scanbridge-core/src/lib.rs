//! # scanbridge-core: Pure Domain Logic for ScanBridge
//!
//! This crate is the **heart** of ScanBridge. It contains the domain
//! decisions of the bridge as pure functions with zero I/O dependencies:
//! the engine crate gathers bytes from the network and filesystem, this
//! crate decides what they mean.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ScanBridge Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Presentation Layer (external)                   │   │
//! │  │        tray icon ──► settings UI ──► folder picker              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ command surface                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    scanbridge-engine                            │   │
//! │  │    discovery probes, session manager, folder sync, aggregator  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ scanbridge-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  scanner  │  │  pairing  │  │  upload   │  │   error   │  │   │
//! │  │   │  records  │  │  payloads │  │  policy   │  │   types   │  │   │
//! │  │   │  merging  │  │  parsing  │  │ signatures│  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO FILESYSTEM • PURE FUNCTIONS         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`scanner`] - Scanner records, protocols, dedup/merge rules
//! - [`pairing`] - Pairing code classification and payload schema
//! - [`upload`] - Post-upload actions, file signatures, upload policy
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Network, keyring, file system access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use scanbridge_core::pairing::PairingInput;
//!
//! // A structured payload carries its own server URL; the caller-supplied
//! // URL is ignored for those.
//! let input = PairingInput::classify(
//!     r#"{"v":1,"server_url":"https://docs.example.com","token":"abc"}"#,
//! ).unwrap();
//! assert!(matches!(input, PairingInput::Structured(_)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod pairing;
pub mod scanner;
pub mod upload;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use pairing::{PairingInput, PairingPayload, PAIRING_SCHEMA_VERSION};
pub use scanner::{
    merge_records, DiscoveryMethod, ScanProtocol, ScannerCapabilities, ScannerRecord,
};
pub use upload::{FileSignature, PostAction, UploadPolicy};
