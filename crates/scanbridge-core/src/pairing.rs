//! # Pairing Codes
//!
//! Classification and parsing of pairing input.
//!
//! ## Input Forms
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Pairing Input Forms                               │
//! │                                                                         │
//! │  STRUCTURED (from a QR code)                                           │
//! │  ────────────────────────────                                          │
//! │  {"v":1,"server_url":"https://docs.example.com","token":"...",         │
//! │   "bridge_name":"Front Desk"}                                          │
//! │                                                                         │
//! │  • Versioned JSON schema; "v" MUST be a supported version              │
//! │  • Carries its own server URL and token material                       │
//! │  • Any separately supplied server URL is IGNORED                       │
//! │                                                                         │
//! │  MANUAL (typed by an operator)                                         │
//! │  ──────────────────────────────                                        │
//! │  XXXX-XXXX-XXXX   (alphanumeric groups joined by '-')                  │
//! │                                                                         │
//! │  • Requires a server URL from the caller                               │
//! │  • Resolved against the backend's resolve-code endpoint                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structured payloads are recognized by parsing, not by sniffing a
//! leading delimiter: input must deserialize as the versioned schema.
//! JSON that parses but declares an unknown version is rejected instead
//! of silently treated as a manual code.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The structured payload schema version this build understands.
pub const PAIRING_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Structured Payload
// =============================================================================

/// A self-contained pairing payload, typically delivered via QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingPayload {
    /// Schema version. Only [`PAIRING_SCHEMA_VERSION`] is accepted.
    pub v: u32,
    /// Backend base URL this payload was issued by.
    pub server_url: String,
    /// Short-lived pairing token to exchange for a credential.
    pub token: String,
    /// Optional display name for the new bridge.
    #[serde(default)]
    pub bridge_name: Option<String>,
}

// =============================================================================
// Classification
// =============================================================================

/// A pairing code classified into one of the supported input forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingInput {
    /// Structured payload carrying its own server URL and token.
    Structured(PairingPayload),
    /// Opaque manual code to resolve against a caller-supplied server.
    Manual(String),
}

impl PairingInput {
    /// Classifies raw pairing input.
    ///
    /// ## Rules
    /// - Empty input → `Required`
    /// - Valid schema JSON with a supported version → `Structured`
    /// - Valid schema JSON with an unsupported version → error
    /// - JSON that is not the schema → error (a pasted-but-broken QR
    ///   payload should fail loudly, not be sent to the server as a code)
    /// - `XXXX-XXXX-XXXX`-shaped code → `Manual`
    /// - Anything else → `UnrecognizedPairingCode`
    pub fn classify(raw: &str) -> CoreResult<PairingInput> {
        let raw = raw.trim();

        if raw.is_empty() {
            return Err(CoreError::Required {
                field: "pairing_code".into(),
            });
        }

        // Attempt the structured schema first. serde_json decides whether
        // this is JSON at all; we decide whether it is OUR JSON.
        if raw.starts_with('{') {
            let payload: PairingPayload =
                serde_json::from_str(raw).map_err(|e| CoreError::InvalidFormat {
                    field: "pairing_code".into(),
                    reason: format!("structured payload did not parse: {}", e),
                })?;

            if payload.v != PAIRING_SCHEMA_VERSION {
                return Err(CoreError::UnsupportedPayloadVersion(payload.v));
            }

            validate_server_url(&payload.server_url)?;

            if payload.token.trim().is_empty() {
                return Err(CoreError::Required {
                    field: "token".into(),
                });
            }

            return Ok(PairingInput::Structured(payload));
        }

        if is_manual_code(raw) {
            return Ok(PairingInput::Manual(raw.to_ascii_uppercase()));
        }

        Err(CoreError::UnrecognizedPairingCode)
    }
}

/// Manual codes are alphanumeric groups joined by hyphens, e.g.
/// `AB12-CD34-EF56`. Group count is not pinned down so the backend can
/// lengthen codes without a bridge update.
fn is_manual_code(raw: &str) -> bool {
    let groups: Vec<&str> = raw.split('-').collect();
    groups.len() >= 2
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Validates a backend base URL.
pub fn validate_server_url(url: &str) -> CoreResult<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(CoreError::Required {
            field: "server_url".into(),
        });
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CoreError::InvalidFormat {
            field: "server_url".into(),
            reason: "must start with http:// or https://".into(),
        });
    }
    Ok(())
}

/// Normalizes a backend base URL for storage (no trailing slash).
pub fn normalize_server_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_structured() {
        let raw = r#"{"v":1,"server_url":"https://docs.example.com","token":"tok-1"}"#;
        match PairingInput::classify(raw).unwrap() {
            PairingInput::Structured(p) => {
                assert_eq!(p.server_url, "https://docs.example.com");
                assert_eq!(p.token, "tok-1");
                assert_eq!(p.bridge_name, None);
            }
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_unknown_version() {
        let raw = r#"{"v":99,"server_url":"https://docs.example.com","token":"tok-1"}"#;
        assert!(matches!(
            PairingInput::classify(raw),
            Err(CoreError::UnsupportedPayloadVersion(99))
        ));
    }

    #[test]
    fn test_classify_rejects_broken_json() {
        assert!(PairingInput::classify(r#"{"v":1,"server_url":"#).is_err());
    }

    #[test]
    fn test_classify_manual() {
        match PairingInput::classify("ab12-cd34-ef56").unwrap() {
            PairingInput::Manual(code) => assert_eq!(code, "AB12-CD34-EF56"),
            other => panic!("expected manual, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(matches!(
            PairingInput::classify("not a code"),
            Err(CoreError::UnrecognizedPairingCode)
        ));
        assert!(matches!(
            PairingInput::classify(""),
            Err(CoreError::Required { .. })
        ));
        // A lone group is not a manual code.
        assert!(PairingInput::classify("ABCD1234").is_err());
    }

    #[test]
    fn test_structured_requires_token() {
        let raw = r#"{"v":1,"server_url":"https://docs.example.com","token":"  "}"#;
        assert!(matches!(
            PairingInput::classify(raw),
            Err(CoreError::Required { .. })
        ));
    }

    #[test]
    fn test_server_url_validation() {
        assert!(validate_server_url("https://docs.example.com").is_ok());
        assert!(validate_server_url("http://localhost:4000").is_ok());
        assert!(validate_server_url("ftp://nope").is_err());
        assert!(validate_server_url("").is_err());
    }

    #[test]
    fn test_normalize_server_url() {
        assert_eq!(
            normalize_server_url("https://docs.example.com/"),
            "https://docs.example.com"
        );
        assert_eq!(
            normalize_server_url("  http://localhost:4000  "),
            "http://localhost:4000"
        );
    }
}
