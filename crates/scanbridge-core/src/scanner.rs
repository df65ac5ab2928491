//! # Scanner Records
//!
//! Domain types for discovered scanners and the merge rules that turn raw
//! probe output into one deduplicated result set.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Record Merge Rules                                 │
//! │                                                                         │
//! │  Probes report independently, so the same physical device can show     │
//! │  up several times:                                                     │
//! │                                                                         │
//! │    mDNS        → { id: "uuid-1", protocols: {escl}, method: mdns }     │
//! │    WS-Discovery→ { id: "uuid-1", protocols: {wsd},  method: wsd  }     │
//! │                                                                         │
//! │  merge_records() folds them by id:                                     │
//! │  • protocols   = union of all protocol sets                            │
//! │  • base record = the one from the most specific discovery method       │
//! │                  (mdns > wsd > subnet_scan)                            │
//! │  • manufacturer "Unknown" is filled from any record that knows it      │
//! │  • result sorted by name (then id for determinism)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records live for one discovery run only; they are never persisted.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Manufacturer placeholder when no probe could identify the vendor.
pub const UNKNOWN_MANUFACTURER: &str = "Unknown";

/// Default eSCL resource path when the device does not advertise one.
pub const DEFAULT_RESOURCE_PATH: &str = "eSCL";

// =============================================================================
// Protocols
// =============================================================================

/// A scan protocol a device was observed to speak.
///
/// `Ord` is derived so protocol sets can live in a `BTreeSet` and
/// serialize in a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanProtocol {
    /// eSCL (AirScan) - HTTP-based driverless scanning.
    Escl,
    /// WS-Discovery / WS-Scan - SOAP-based probe and scan.
    Wsd,
    /// Advertised as a scanner without a recognizable scan protocol.
    Generic,
}

impl std::fmt::Display for ScanProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanProtocol::Escl => write!(f, "escl"),
            ScanProtocol::Wsd => write!(f, "wsd"),
            ScanProtocol::Generic => write!(f, "generic"),
        }
    }
}

// =============================================================================
// Discovery Method
// =============================================================================

/// The probe that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    /// mDNS/Zeroconf service browse.
    Mdns,
    /// WS-Discovery probe/match exchange.
    Wsd,
    /// Active scan across the local subnet.
    SubnetScan,
}

impl DiscoveryMethod {
    /// Relative specificity of the probe. mDNS carries the richest device
    /// metadata (TXT records), WS-Discovery carries typed endpoints, the
    /// subnet scan only proves an endpoint answers.
    pub fn specificity(&self) -> u8 {
        match self {
            DiscoveryMethod::Mdns => 3,
            DiscoveryMethod::Wsd => 2,
            DiscoveryMethod::SubnetScan => 1,
        }
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryMethod::Mdns => write!(f, "mdns"),
            DiscoveryMethod::Wsd => write!(f, "wsd"),
            DiscoveryMethod::SubnetScan => write!(f, "subnet_scan"),
        }
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Capability hints gathered during discovery.
///
/// These come from mDNS TXT records or capability queries and are hints
/// only; the backend treats them as advisory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerCapabilities {
    pub duplex: bool,
    pub adf: bool,
    pub flatbed: bool,
    pub max_resolution: u32,
    pub color_modes: Vec<String>,
    pub formats: Vec<String>,
}

impl ScannerCapabilities {
    /// True when nothing about the device is known.
    pub fn is_empty(&self) -> bool {
        *self == ScannerCapabilities::default()
    }
}

// =============================================================================
// Scanner Record
// =============================================================================

/// A scanner observed during one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerRecord {
    /// Stable fingerprint for this physical device within one run.
    pub id: String,
    /// Display name (usually the advertised model string).
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub ip: String,
    pub port: u16,
    /// Whether the scan endpoint expects TLS.
    pub use_tls: bool,
    /// Protocols this device was observed to speak, across all probes.
    pub protocols: BTreeSet<ScanProtocol>,
    pub capabilities: ScannerCapabilities,
    /// The probe that produced (the base of) this record.
    pub discovery_method: DiscoveryMethod,
    /// eSCL resource path from the mDNS `rs` TXT record (e.g. "eSCL2").
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
}

fn default_resource_path() -> String {
    DEFAULT_RESOURCE_PATH.to_string()
}

impl ScannerRecord {
    /// Derives the stable record fingerprint.
    ///
    /// Devices that advertise a UUID keep it across probes, so records
    /// from different protocols collapse onto one id. Devices without a
    /// UUID fall back to their endpoint address.
    pub fn fingerprint(device_uuid: Option<&str>, ip: &str, port: u16) -> String {
        match device_uuid {
            Some(uuid) if !uuid.trim().is_empty() => uuid.trim().to_ascii_lowercase(),
            _ => format!("{}:{}", ip, port),
        }
    }

    /// Folds `other` into `self` per the merge rules: protocol union,
    /// most-specific base, unknown manufacturer filled in.
    pub fn absorb(&mut self, other: ScannerRecord) {
        debug_assert_eq!(self.id, other.id);

        if other.discovery_method.specificity() > self.discovery_method.specificity() {
            // The newcomer knows the device better; keep its identity
            // fields and fold our protocols into it.
            let mut base = other;
            base.protocols.extend(self.protocols.iter().copied());
            if base.manufacturer == UNKNOWN_MANUFACTURER
                && self.manufacturer != UNKNOWN_MANUFACTURER
            {
                base.manufacturer = self.manufacturer.clone();
            }
            if base.capabilities.is_empty() && !self.capabilities.is_empty() {
                base.capabilities = self.capabilities.clone();
            }
            *self = base;
        } else {
            self.protocols.extend(other.protocols.iter().copied());
            if self.manufacturer == UNKNOWN_MANUFACTURER
                && other.manufacturer != UNKNOWN_MANUFACTURER
            {
                self.manufacturer = other.manufacturer;
            }
            if self.capabilities.is_empty() && !other.capabilities.is_empty() {
                self.capabilities = other.capabilities;
            }
        }
    }

    /// Base URL of the device's scan endpoint.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}:{}/{}", scheme, self.ip, self.port, self.resource_path)
    }
}

// =============================================================================
// Merging
// =============================================================================

/// Deduplicates raw probe output into one record per physical device.
///
/// Records with the same id are folded together ([`ScannerRecord::absorb`]);
/// the result is sorted by name, then id, so repeated runs over the same
/// network produce identical output.
pub fn merge_records(raw: Vec<ScannerRecord>) -> Vec<ScannerRecord> {
    let mut by_id: HashMap<String, ScannerRecord> = HashMap::new();

    for record in raw {
        match by_id.get_mut(&record.id) {
            Some(existing) => existing.absorb(record),
            None => {
                by_id.insert(record.id.clone(), record);
            }
        }
    }

    let mut merged: Vec<ScannerRecord> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}

// =============================================================================
// Manufacturer Extraction
// =============================================================================

/// Known vendor substrings in advertised model strings.
const MANUFACTURERS: &[(&str, &str)] = &[
    ("hp", "HP"),
    ("hewlett", "HP"),
    ("canon", "Canon"),
    ("brother", "Brother"),
    ("epson", "Epson"),
    ("samsung", "Samsung"),
    ("xerox", "Xerox"),
    ("lexmark", "Lexmark"),
    ("ricoh", "Ricoh"),
    ("kyocera", "Kyocera"),
    ("konica", "Konica Minolta"),
];

/// Extracts the manufacturer from an advertised model string.
pub fn extract_manufacturer(model: &str) -> String {
    let model_lower = model.to_lowercase();
    for (needle, name) in MANUFACTURERS {
        if model_lower.contains(needle) {
            return (*name).to_string();
        }
    }
    UNKNOWN_MANUFACTURER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        id: &str,
        name: &str,
        protocol: ScanProtocol,
        method: DiscoveryMethod,
    ) -> ScannerRecord {
        ScannerRecord {
            id: id.into(),
            name: name.into(),
            manufacturer: UNKNOWN_MANUFACTURER.into(),
            model: name.into(),
            ip: "192.168.1.50".into(),
            port: 80,
            use_tls: false,
            protocols: BTreeSet::from([protocol]),
            capabilities: ScannerCapabilities::default(),
            discovery_method: method,
            resource_path: DEFAULT_RESOURCE_PATH.into(),
        }
    }

    #[test]
    fn test_fingerprint_prefers_uuid() {
        assert_eq!(
            ScannerRecord::fingerprint(Some("ABC-123"), "10.0.0.5", 80),
            "abc-123"
        );
        assert_eq!(
            ScannerRecord::fingerprint(None, "10.0.0.5", 8080),
            "10.0.0.5:8080"
        );
        // Whitespace-only UUID falls back to the endpoint.
        assert_eq!(
            ScannerRecord::fingerprint(Some("  "), "10.0.0.5", 80),
            "10.0.0.5:80"
        );
    }

    #[test]
    fn test_merge_unions_protocols() {
        let a = record("dev-1", "Office MFP", ScanProtocol::Escl, DiscoveryMethod::Mdns);
        let b = record("dev-1", "Office MFP", ScanProtocol::Wsd, DiscoveryMethod::Wsd);

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].protocols,
            BTreeSet::from([ScanProtocol::Escl, ScanProtocol::Wsd])
        );
        // mDNS is more specific than WSD, so it stays the base.
        assert_eq!(merged[0].discovery_method, DiscoveryMethod::Mdns);
    }

    #[test]
    fn test_merge_prefers_most_specific_method() {
        // Subnet scan found it first; the later mDNS record takes over.
        let a = record("dev-2", "Scanner at 192.168.1.50", ScanProtocol::Escl, DiscoveryMethod::SubnetScan);
        let mut b = record("dev-2", "Brother ADS-1700W", ScanProtocol::Escl, DiscoveryMethod::Mdns);
        b.manufacturer = "Brother".into();

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].discovery_method, DiscoveryMethod::Mdns);
        assert_eq!(merged[0].name, "Brother ADS-1700W");
        assert_eq!(merged[0].manufacturer, "Brother");
    }

    #[test]
    fn test_merge_fills_unknown_manufacturer() {
        let mut a = record("dev-3", "MFP", ScanProtocol::Escl, DiscoveryMethod::Mdns);
        a.manufacturer = UNKNOWN_MANUFACTURER.into();
        let mut b = record("dev-3", "MFP", ScanProtocol::Wsd, DiscoveryMethod::Wsd);
        b.manufacturer = "Epson".into();

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged[0].manufacturer, "Epson");
        // The base record stays the mDNS one.
        assert_eq!(merged[0].discovery_method, DiscoveryMethod::Mdns);
    }

    #[test]
    fn test_merge_sorts_by_name() {
        let a = record("dev-b", "zeta", ScanProtocol::Escl, DiscoveryMethod::Mdns);
        let b = record("dev-a", "Alpha", ScanProtocol::Escl, DiscoveryMethod::Mdns);

        let merged = merge_records(vec![a, b]);
        assert_eq!(merged[0].name, "Alpha");
        assert_eq!(merged[1].name, "zeta");
    }

    #[test]
    fn test_extract_manufacturer() {
        assert_eq!(extract_manufacturer("HP LaserJet Pro"), "HP");
        assert_eq!(extract_manufacturer("Hewlett-Packard M1536"), "HP");
        assert_eq!(extract_manufacturer("KONICA MINOLTA bizhub"), "Konica Minolta");
        assert_eq!(extract_manufacturer("Mystery Device"), UNKNOWN_MANUFACTURER);
    }

    #[test]
    fn test_endpoint_url() {
        let mut r = record("dev-1", "MFP", ScanProtocol::Escl, DiscoveryMethod::Mdns);
        assert_eq!(r.endpoint_url(), "http://192.168.1.50:80/eSCL");
        r.use_tls = true;
        r.port = 443;
        r.resource_path = "eSCL2".into();
        assert_eq!(r.endpoint_url(), "https://192.168.1.50:443/eSCL2");
    }
}
