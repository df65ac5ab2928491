//! # Discovery Engine
//!
//! Finds scanners on the local network by fanning out independent
//! protocol probes and folding their results into one deduplicated list.
//!
//! ## Probe Fan-Out
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Discovery Fan-Out / Fan-In                         │
//! │                                                                         │
//! │                        discover()                                       │
//! │                            │                                            │
//! │        ┌───────────────────┼───────────────────┐                        │
//! │        ▼                   ▼                   ▼                        │
//! │  ┌───────────┐      ┌───────────┐      ┌──────────────┐                │
//! │  │   mDNS    │      │    WSD    │      │ Subnet Scan  │                │
//! │  │  browse   │      │ probe/    │      │ (bounded     │                │
//! │  │ (_uscan…) │      │  match    │      │  concurrency)│                │
//! │  └─────┬─────┘      └─────┬─────┘      └──────┬───────┘                │
//! │        │ own timeout      │ own timeout       │ own timeout            │
//! │        └───────────────────┼───────────────────┘                        │
//! │                            ▼                                            │
//! │              merge_records() + stats update                             │
//! │                                                                         │
//! │  • A slow or dead probe never delays the others                        │
//! │  • A failed probe yields zero records, never an error                  │
//! │  • The overall timeout returns whatever has arrived so far             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use scanbridge_core::scanner::{
    extract_manufacturer, merge_records, DiscoveryMethod, ScanProtocol, ScannerCapabilities,
    ScannerRecord, DEFAULT_RESOURCE_PATH, UNKNOWN_MANUFACTURER,
};

use crate::config::DiscoverySettings;
use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Constants
// =============================================================================

/// mDNS service types browsed for scanners. eSCL over TLS, eSCL, then
/// generic scanner advertisements.
const MDNS_SERVICE_TYPES: &[&str] = &[
    "_uscan._tcp.local.",
    "_uscans._tcp.local.",
    "_scanner._tcp.local.",
];

/// WS-Discovery multicast endpoint.
const WSD_MULTICAST_ADDR: &str = "239.255.255.250:3702";

/// Per-request timeout for subnet capability queries.
const CAPABILITY_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Discovery Stats
// =============================================================================

/// Result metadata of the most recent discovery run.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStats {
    pub scanner_count: usize,
    pub last_discovery: Option<DateTime<Utc>>,
}

// =============================================================================
// Discovery Engine
// =============================================================================

/// Runs protocol probes and merges their output.
pub struct DiscoveryEngine {
    settings: DiscoverySettings,
    stats: Arc<RwLock<DiscoveryStats>>,
}

impl DiscoveryEngine {
    pub fn new(settings: DiscoverySettings) -> Self {
        DiscoveryEngine {
            settings,
            stats: Arc::new(RwLock::new(DiscoveryStats::default())),
        }
    }

    /// Shared handle to the discovery stats (read by the aggregator).
    pub fn stats_handle(&self) -> Arc<RwLock<DiscoveryStats>> {
        self.stats.clone()
    }

    /// Runs all enabled probes with the configured overall timeout.
    pub async fn discover(&self) -> Vec<ScannerRecord> {
        self.discover_with_timeout(self.settings.overall_timeout())
            .await
    }

    /// Runs all enabled probes concurrently and returns the merged,
    /// deduplicated scanner list.
    ///
    /// Blocks until every probe finished or `overall_timeout` elapsed,
    /// whichever comes first; partial results are still returned. Probe
    /// failures are logged, never surfaced.
    pub async fn discover_with_timeout(&self, overall_timeout: Duration) -> Vec<ScannerRecord> {
        let probe_timeout = self.settings.probe_timeout().min(overall_timeout);
        let (tx, mut rx) = mpsc::channel::<Vec<ScannerRecord>>(4);
        let mut launched = 0usize;

        if self.settings.mdns_enabled {
            launched += 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let records = run_probe("mdns", probe_mdns(probe_timeout)).await;
                let _ = tx.send(records).await;
            });
        }

        if self.settings.wsd_enabled {
            launched += 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let records = run_probe("wsd", probe_wsd(probe_timeout)).await;
                let _ = tx.send(records).await;
            });
        }

        if self.settings.subnet_scan_enabled {
            launched += 1;
            let tx = tx.clone();
            let concurrency = self.settings.subnet_concurrency;
            let ports = self.settings.subnet_ports.clone();
            tokio::spawn(async move {
                let records =
                    run_probe("subnet_scan", probe_subnet(probe_timeout, concurrency, ports))
                        .await;
                let _ = tx.send(records).await;
            });
        }
        drop(tx);

        // Fan-in: collect probe outputs until all arrived or the overall
        // deadline passes.
        let deadline = Instant::now() + overall_timeout;
        let mut raw = Vec::new();
        let mut finished = 0usize;

        while finished < launched {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    finished,
                    launched, "Discovery overall timeout elapsed, returning partial results"
                );
                break;
            }

            match timeout(remaining, rx.recv()).await {
                Ok(Some(records)) => {
                    raw.extend(records);
                    finished += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        finished,
                        launched, "Discovery overall timeout elapsed, returning partial results"
                    );
                    break;
                }
            }
        }

        let merged = merge_records(raw);

        {
            let mut stats = self.stats.write().await;
            stats.scanner_count = merged.len();
            stats.last_discovery = Some(Utc::now());
        }

        info!(count = merged.len(), "Discovery run complete");
        merged
    }
}

/// Runs one probe, translating failure into an empty result.
async fn run_probe(
    name: &'static str,
    probe: impl std::future::Future<Output = BridgeResult<Vec<ScannerRecord>>>,
) -> Vec<ScannerRecord> {
    match probe.await {
        Ok(records) => {
            debug!(probe = name, count = records.len(), "Probe finished");
            records
        }
        Err(e) => {
            warn!(probe = name, error = %e, "Probe failed");
            Vec::new()
        }
    }
}

// =============================================================================
// mDNS Probe
// =============================================================================

/// Browses the known scanner service types.
async fn probe_mdns(probe_timeout: Duration) -> BridgeResult<Vec<ScannerRecord>> {
    let mdns = ServiceDaemon::new()
        .map_err(|e| BridgeError::Internal(format!("mDNS daemon failed: {}", e)))?;

    let mut tasks = Vec::new();
    for service_type in MDNS_SERVICE_TYPES {
        let receiver = match mdns.browse(service_type) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(service_type, error = %e, "mDNS browse failed");
                continue;
            }
        };
        let use_tls = *service_type == "_uscans._tcp.local.";
        let generic = *service_type == "_scanner._tcp.local.";

        tasks.push(tokio::spawn(async move {
            let mut records = Vec::new();
            let collect = async {
                loop {
                    match receiver.recv_async().await {
                        Ok(ServiceEvent::ServiceResolved(info)) => {
                            if let Some(record) = parse_mdns_service(&info, use_tls, generic) {
                                debug!(
                                    name = %record.name,
                                    ip = %record.ip,
                                    port = record.port,
                                    "mDNS scanner resolved"
                                );
                                records.push(record);
                            }
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }
            };
            let _ = timeout(probe_timeout, collect).await;
            records
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        if let Ok(records) = task.await {
            all.extend(records);
        }
    }

    let _ = mdns.shutdown();
    Ok(all)
}

/// Converts a resolved mDNS service into a scanner record.
fn parse_mdns_service(info: &ServiceInfo, use_tls: bool, generic: bool) -> Option<ScannerRecord> {
    let ip = info.get_addresses().iter().next()?.to_string();
    let port = info.get_port();

    let properties = info.get_properties();
    let model = properties
        .get("ty")
        .or_else(|| properties.get("product"))
        .map(|v| v.val_str().to_string())
        .unwrap_or_else(|| info.get_fullname().to_string());

    let device_uuid = properties.get("uuid").map(|v| v.val_str().to_string());
    let id = ScannerRecord::fingerprint(device_uuid.as_deref(), &ip, port);

    // Capability hints from TXT records.
    let duplex = properties
        .get("duplex")
        .map(|v| matches!(v.val_str().to_lowercase().as_str(), "t" | "true" | "1"))
        .unwrap_or(false);

    let input_sources = properties
        .get("is")
        .map(|v| v.val_str().to_lowercase())
        .unwrap_or_default();
    let adf = input_sources.contains("adf") || input_sources.contains("feeder");
    let flatbed = input_sources.contains("platen") || input_sources.is_empty();

    // eSCL resource path ("rs" TXT record, e.g. "eSCL2").
    let resource_path = properties
        .get("rs")
        .map(|v| v.val_str().trim_start_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RESOURCE_PATH.to_string());

    let protocol = if generic {
        ScanProtocol::Generic
    } else {
        ScanProtocol::Escl
    };

    Some(ScannerRecord {
        id,
        name: model.clone(),
        manufacturer: extract_manufacturer(&model),
        model,
        ip,
        port,
        use_tls,
        protocols: BTreeSet::from([protocol]),
        capabilities: ScannerCapabilities {
            duplex,
            adf,
            flatbed,
            max_resolution: 600,
            color_modes: vec!["RGB24".into(), "Grayscale8".into()],
            formats: vec!["application/pdf".into(), "image/jpeg".into()],
        },
        discovery_method: DiscoveryMethod::Mdns,
        resource_path,
    })
}

// =============================================================================
// WS-Discovery Probe
// =============================================================================

/// Sends a WS-Discovery Probe and collects ProbeMatch responses.
async fn probe_wsd(probe_timeout: Duration) -> BridgeResult<Vec<ScannerRecord>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| BridgeError::Internal(format!("WSD socket bind failed: {}", e)))?;

    let probe = build_wsd_probe(&Uuid::new_v4());
    socket
        .send_to(probe.as_bytes(), WSD_MULTICAST_ADDR)
        .await
        .map_err(|e| BridgeError::Internal(format!("WSD probe send failed: {}", e)))?;

    debug!("Sent WS-Discovery probe, collecting matches");

    let mut records = Vec::new();
    let mut buf = vec![0u8; 16 * 1024];
    let deadline = Instant::now() + probe_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, addr))) => {
                let body = String::from_utf8_lossy(&buf[..len]);
                if let Some(record) = parse_probe_match(&body, addr.ip()) {
                    debug!(ip = %record.ip, port = record.port, "WSD scanner matched");
                    records.push(record);
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Error receiving WSD response");
            }
            Err(_) => break,
        }
    }

    Ok(records)
}

/// Builds the SOAP Probe envelope for scan devices.
fn build_wsd_probe(message_id: &Uuid) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope"#,
            r#" xmlns:soap="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing""#,
            r#" xmlns:wsd="http://schemas.xmlsoap.org/ws/2005/04/discovery""#,
            r#" xmlns:wscn="http://schemas.microsoft.com/windows/2006/08/wdp/scan">"#,
            r#"<soap:Header>"#,
            r#"<wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>"#,
            r#"<wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</wsa:Action>"#,
            r#"<wsa:MessageID>urn:uuid:{id}</wsa:MessageID>"#,
            r#"</soap:Header>"#,
            r#"<soap:Body><wsd:Probe><wsd:Types>wscn:ScanDeviceType</wsd:Types></wsd:Probe></soap:Body>"#,
            r#"</soap:Envelope>"#
        ),
        id = message_id
    )
}

/// Parses a ProbeMatch response into a scanner record.
///
/// The match is accepted when it advertises a scan device type and
/// carries a resolvable transport address. WSD responses vary widely
/// across vendors, so parsing is tolerant: namespace prefixes are
/// ignored and only the tags we need are extracted.
fn parse_probe_match(body: &str, from_ip: IpAddr) -> Option<ScannerRecord> {
    if !body.contains("ProbeMatch") {
        return None;
    }

    let types = extract_tag_text(body, "Types").unwrap_or_default();
    if !types.contains("ScanDeviceType") && !types.to_lowercase().contains("scan") {
        return None;
    }

    // Endpoint UUID (urn:uuid:...) keyed to the same device across probes.
    let device_uuid = extract_tag_text(body, "Address")
        .and_then(|addr| addr.strip_prefix("urn:uuid:").map(str::to_string));

    // First transport address, if the device advertises one.
    let (ip, port) = extract_tag_text(body, "XAddrs")
        .and_then(|xaddrs| parse_first_xaddr(&xaddrs))
        .unwrap_or_else(|| (from_ip.to_string(), 80));

    let id = ScannerRecord::fingerprint(device_uuid.as_deref(), &ip, port);
    let name = format!("WSD Scanner at {}", ip);

    Some(ScannerRecord {
        id,
        name: name.clone(),
        manufacturer: UNKNOWN_MANUFACTURER.to_string(),
        model: name,
        ip,
        port,
        use_tls: false,
        protocols: BTreeSet::from([ScanProtocol::Wsd]),
        capabilities: ScannerCapabilities::default(),
        discovery_method: DiscoveryMethod::Wsd,
        resource_path: DEFAULT_RESOURCE_PATH.to_string(),
    })
}

/// Extracts the text of the first `<...:tag>` element, ignoring the
/// namespace prefix.
fn extract_tag_text(body: &str, tag: &str) -> Option<String> {
    let open_plain = format!("<{}>", tag);
    let open_prefixed = format!(":{}>", tag);

    let content_start = if let Some(pos) = body.find(&open_plain) {
        pos + open_plain.len()
    } else {
        // "<wsd:Types>" - find ":Types>" and verify it closes a tag we
        // opened with '<'.
        let pos = body.find(&open_prefixed)?;
        let tag_open = body[..pos].rfind('<')?;
        if body[tag_open..pos].contains('>') {
            return None;
        }
        pos + open_prefixed.len()
    };

    let rest = &body[content_start..];
    let content_end = rest.find("</")?;
    Some(rest[..content_end].trim().to_string())
}

/// Parses the first whitespace-separated transport URL in an XAddrs list.
fn parse_first_xaddr(xaddrs: &str) -> Option<(String, u16)> {
    let first = xaddrs.split_whitespace().next()?;
    let url = Url::parse(first).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    Some((host, port))
}

// =============================================================================
// Subnet Scan Probe
// =============================================================================

/// Actively scans the local /24 for eSCL endpoints.
async fn probe_subnet(
    probe_timeout: Duration,
    concurrency: usize,
    ports: Vec<u16>,
) -> BridgeResult<Vec<ScannerRecord>> {
    let local_ip = local_ip_address::local_ip()
        .map_err(|e| BridgeError::Internal(format!("Local IP lookup failed: {}", e)))?;
    let subnet = match subnet_prefix(&local_ip) {
        Some(prefix) => prefix,
        None => {
            debug!(%local_ip, "No IPv4 subnet to scan");
            return Ok(Vec::new());
        }
    };

    let client = reqwest::Client::builder()
        .timeout(CAPABILITY_QUERY_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| BridgeError::Internal(format!("HTTP client build failed: {}", e)))?;

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for host in 1u8..=254 {
        let ip = format!("{}.{}", subnet, host);
        for &port in &ports {
            let client = client.clone();
            let semaphore = semaphore.clone();
            let ip = ip.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                query_escl_capabilities(&client, &ip, port).await
            });
        }
    }

    let mut records = Vec::new();
    let deadline = Instant::now() + probe_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!("Subnet scan timeout elapsed, aborting remaining queries");
            break;
        }
        match timeout(remaining, tasks.join_next()).await {
            Ok(Some(Ok(Some(record)))) => records.push(record),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => break,
        }
    }

    Ok(records)
}

/// Issues the lightweight eSCL capability query to one candidate host.
async fn query_escl_capabilities(
    client: &reqwest::Client,
    ip: &str,
    port: u16,
) -> Option<ScannerRecord> {
    let scheme = if port == 443 { "https" } else { "http" };
    let url = format!("{}://{}:{}/eSCL/ScannerCapabilities", scheme, ip, port);

    let response = client.get(&url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }

    let body = response.text().await.ok()?;
    if !body.contains("ScannerCapabilities") {
        return None;
    }

    Some(ScannerRecord {
        id: ScannerRecord::fingerprint(None, ip, port),
        name: format!("Scanner at {}", ip),
        manufacturer: UNKNOWN_MANUFACTURER.to_string(),
        model: format!("eSCL Scanner ({})", ip),
        ip: ip.to_string(),
        port,
        use_tls: port == 443,
        protocols: BTreeSet::from([ScanProtocol::Escl]),
        capabilities: ScannerCapabilities::default(),
        discovery_method: DiscoveryMethod::SubnetScan,
        resource_path: DEFAULT_RESOURCE_PATH.to_string(),
    })
}

/// /24 prefix of the local IPv4 address.
fn subnet_prefix(ip: &IpAddr) -> Option<String> {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            Some(format!("{}.{}.{}", octets[0], octets[1], octets[2]))
        }
        IpAddr::V6(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_build_wsd_probe() {
        let id = Uuid::new_v4();
        let probe = build_wsd_probe(&id);
        assert!(probe.contains(&format!("urn:uuid:{}", id)));
        assert!(probe.contains("wscn:ScanDeviceType"));
        assert!(probe.contains("discovery/Probe"));
    }

    #[test]
    fn test_extract_tag_text() {
        let xml = "<a:Envelope><wsd:Types>wscn:ScanDeviceType</wsd:Types></a:Envelope>";
        assert_eq!(
            extract_tag_text(xml, "Types").as_deref(),
            Some("wscn:ScanDeviceType")
        );
        assert_eq!(extract_tag_text(xml, "XAddrs"), None);

        let plain = "<Types> scan </Types>";
        assert_eq!(extract_tag_text(plain, "Types").as_deref(), Some("scan"));
    }

    #[test]
    fn test_parse_first_xaddr() {
        assert_eq!(
            parse_first_xaddr("http://192.168.1.42:8018/wsd http://[fe80::1]/wsd"),
            Some(("192.168.1.42".into(), 8018))
        );
        assert_eq!(
            parse_first_xaddr("http://192.168.1.42/wsd"),
            Some(("192.168.1.42".into(), 80))
        );
        assert_eq!(parse_first_xaddr(""), None);
    }

    #[test]
    fn test_parse_probe_match() {
        let body = concat!(
            "<soap:Envelope><soap:Body><wsd:ProbeMatches><wsd:ProbeMatch>",
            "<wsa:EndpointReference><wsa:Address>urn:uuid:1234-abcd</wsa:Address>",
            "</wsa:EndpointReference>",
            "<wsd:Types>wscn:ScanDeviceType</wsd:Types>",
            "<wsd:XAddrs>http://192.168.1.42:8018/wsd</wsd:XAddrs>",
            "</wsd:ProbeMatch></wsd:ProbeMatches></soap:Body></soap:Envelope>"
        );
        let record =
            parse_probe_match(body, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42))).unwrap();
        assert_eq!(record.id, "1234-abcd");
        assert_eq!(record.ip, "192.168.1.42");
        assert_eq!(record.port, 8018);
        assert_eq!(record.discovery_method, DiscoveryMethod::Wsd);
        assert!(record.protocols.contains(&ScanProtocol::Wsd));
    }

    #[test]
    fn test_parse_probe_match_rejects_printers() {
        let body = concat!(
            "<wsd:ProbeMatch>",
            "<wsd:Types>wprt:PrintDeviceType</wsd:Types>",
            "<wsd:XAddrs>http://192.168.1.9/wsd</wsd:XAddrs>",
            "</wsd:ProbeMatch>"
        );
        assert!(parse_probe_match(body, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 9))).is_none());
    }

    #[test]
    fn test_subnet_prefix() {
        assert_eq!(
            subnet_prefix(&IpAddr::V4(Ipv4Addr::new(192, 168, 4, 17))).as_deref(),
            Some("192.168.4")
        );
        assert_eq!(subnet_prefix(&"::1".parse().unwrap()), None);
    }
}
