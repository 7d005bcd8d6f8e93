//! Core domain types for Argus network discovery.
//!
//! These types describe what a single discovery run looked at and what it
//! found. They are shared between the discovery engine and whatever consumes
//! its results (stores, dashboards, schedulers).

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ArgusError;

// ── Scan identity ─────────────────────────────────────────────────

/// Unique identifier for one discovery run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScanId(pub Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ── Network ranges ────────────────────────────────────────────────

/// An IPv4 CIDR block selected for scanning.
///
/// `interface` names where the range came from: a local interface name,
/// `"configured"` for explicit targets, or `"fallback"` for default ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NetworkRange {
    pub network: Ipv4Net,
    pub interface: String,
}

impl NetworkRange {
    /// Build a range, truncating any host bits so the base address is the
    /// network address.
    pub fn new(network: Ipv4Net, interface: impl Into<String>) -> Self {
        Self {
            network: network.trunc(),
            interface: interface.into(),
        }
    }

    /// Parse a CIDR string such as `192.168.1.0/24`.
    pub fn parse(cidr: &str, interface: impl Into<String>) -> Result<Self, ArgusError> {
        let network: Ipv4Net = cidr
            .trim()
            .parse()
            .map_err(|e: ipnet::AddrParseError| ArgusError::InvalidRange {
                cidr: cidr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(network, interface))
    }

    pub fn base(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }

    /// Number of usable host addresses in the range.
    pub fn host_count(&self) -> u64 {
        let size = 1u64 << (32 - u32::from(self.prefix_len()));
        if self.prefix_len() >= 31 {
            size
        } else {
            size - 2
        }
    }

    /// Usable host addresses: network and broadcast addresses are excluded
    /// for every prefix shorter than /31.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.network.hosts()
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

// ── Devices ───────────────────────────────────────────────────────

/// Heuristic category assigned to a discovered host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Router,
    Switch,
    Firewall,
    Printer,
    Server,
    Endpoint,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Router => "router",
            DeviceCategory::Switch => "switch",
            DeviceCategory::Firewall => "firewall",
            DeviceCategory::Printer => "printer",
            DeviceCategory::Server => "server",
            DeviceCategory::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Alive,
    Unreachable,
}

/// One host that answered a liveness probe during a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub ip: String,
    pub hostname: Option<String>,
    /// Uppercase, colon-separated MAC address.
    pub mac_address: Option<String>,
    pub category: DeviceCategory,
    pub status: HostStatus,
    /// Open ports in ascending order.
    pub open_ports: Vec<u16>,
    pub discovered_at: DateTime<Utc>,
    /// Liveness probe round-trip time.
    pub latency_ms: Option<f64>,
}

impl Device {
    /// Shown in place of a MAC address the neighbour table did not know.
    pub const UNKNOWN_MAC: &'static str = "unknown";

    pub fn mac_or_unknown(&self) -> &str {
        self.mac_address.as_deref().unwrap_or(Self::UNKNOWN_MAC)
    }

    /// Resolved hostname, or a placeholder derived from the address.
    pub fn display_name(&self) -> String {
        match &self.hostname {
            Some(name) => name.clone(),
            None => placeholder_hostname(&self.ip),
        }
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.ip.parse().ok()
    }
}

/// `192.168.1.20` becomes `host-192-168-1-20`.
pub fn placeholder_hostname(ip: &str) -> String {
    format!("host-{}", ip.replace(['.', ':'], "-"))
}

// ── Scan results ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl ScanStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScanStatus::Completed)
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ScanStatus::Running)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::TimedOut => "timed_out",
            ScanStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything one discovery run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: ScanId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub ranges: Vec<NetworkRange>,
    /// Addresses handed to the liveness probe.
    pub hosts_probed: u64,
    pub devices: Vec<Device>,
    pub status: ScanStatus,
    /// Run-level failure reason, set only for `Failed` runs.
    pub error: Option<String>,
}

impl ScanResult {
    /// Start a new in-progress result.
    pub fn begin(scan_id: ScanId, ranges: Vec<NetworkRange>) -> Self {
        Self {
            scan_id,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            ranges,
            hosts_probed: 0,
            devices: Vec::new(),
            status: ScanStatus::Running,
            error: None,
        }
    }

    /// Append a discovered device. Ignored once the result is finalized or
    /// when the device is not alive.
    pub fn record(&mut self, device: Device) {
        if self.status.is_final() || device.status != HostStatus::Alive {
            return;
        }
        self.devices.push(device);
    }

    /// Finalize the result. Devices are sorted by address. Has no effect on
    /// an already finalized result.
    pub fn finish(&mut self, status: ScanStatus, elapsed: Duration) {
        if self.status.is_final() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.duration_ms = Some(elapsed.as_millis() as u64);
        self.devices.sort_by_key(|d| d.ipv4());
    }

    /// Finalize the result as a run-level failure.
    pub fn fail(&mut self, reason: impl Into<String>, elapsed: Duration) {
        if self.status.is_final() {
            return;
        }
        self.error = Some(reason.into());
        self.finish(ScanStatus::Failed, elapsed);
    }

    pub fn device(&self, ip: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.ip == ip)
    }

    pub fn count_by_category(&self) -> BTreeMap<DeviceCategory, usize> {
        let mut counts = BTreeMap::new();
        for device in &self.devices {
            *counts.entry(device.category).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: &str, category: DeviceCategory) -> Device {
        Device {
            ip: ip.to_string(),
            hostname: None,
            mac_address: None,
            category,
            status: HostStatus::Alive,
            open_ports: vec![],
            discovered_at: Utc::now(),
            latency_ms: Some(1.5),
        }
    }

    #[test]
    fn range_truncates_host_bits() {
        let range = NetworkRange::parse("192.168.1.77/24", "eth0").unwrap();
        assert_eq!(range.base(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(range.prefix_len(), 24);
        assert_eq!(range.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn range_hosts_exclude_network_and_broadcast() {
        let range = NetworkRange::parse("10.0.0.0/24", "eth0").unwrap();
        let hosts: Vec<Ipv4Addr> = range.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(range.host_count(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(10, 0, 0, 254)));
    }

    #[test]
    fn range_point_to_point_keeps_both_addresses() {
        let range = NetworkRange::parse("10.0.0.0/31", "tun0").unwrap();
        assert_eq!(range.hosts().count(), 2);
        assert_eq!(range.host_count(), 2);
    }

    #[test]
    fn range_rejects_garbage() {
        let err = NetworkRange::parse("not-a-cidr", "configured").unwrap_err();
        assert!(matches!(err, ArgusError::InvalidRange { .. }));
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&DeviceCategory::Printer).unwrap();
        assert_eq!(json, "\"printer\"");
        let json = serde_json::to_string(&ScanStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }

    #[test]
    fn device_placeholders() {
        let d = device("192.168.1.20", DeviceCategory::Endpoint);
        assert_eq!(d.mac_or_unknown(), "unknown");
        assert_eq!(d.display_name(), "host-192-168-1-20");
    }

    #[test]
    fn finish_sorts_devices_and_freezes_result() {
        let mut result = ScanResult::begin(ScanId::new(), vec![]);
        result.record(device("10.0.0.20", DeviceCategory::Server));
        result.record(device("10.0.0.3", DeviceCategory::Router));
        result.finish(ScanStatus::Completed, Duration::from_millis(1200));

        assert_eq!(result.status, ScanStatus::Completed);
        assert_eq!(result.duration_ms, Some(1200));
        assert!(result.finished_at.is_some());
        assert_eq!(result.devices[0].ip, "10.0.0.3");

        result.record(device("10.0.0.4", DeviceCategory::Endpoint));
        result.finish(ScanStatus::Failed, Duration::from_secs(9));
        assert_eq!(result.devices.len(), 2);
        assert_eq!(result.status, ScanStatus::Completed);
    }

    #[test]
    fn unreachable_devices_are_not_recorded() {
        let mut result = ScanResult::begin(ScanId::new(), vec![]);
        let mut d = device("10.0.0.9", DeviceCategory::Endpoint);
        d.status = HostStatus::Unreachable;
        result.record(d);
        assert!(result.devices.is_empty());
    }

    #[test]
    fn fail_records_reason() {
        let mut result = ScanResult::begin(ScanId::new(), vec![]);
        result.fail("no scannable addresses", Duration::ZERO);
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no scannable addresses"));
    }

    #[test]
    fn result_serialization_roundtrip() {
        let mut result = ScanResult::begin(
            ScanId::new(),
            vec![NetworkRange::parse("192.168.1.0/24", "eth0").unwrap()],
        );
        result.record(device("192.168.1.1", DeviceCategory::Router));
        result.record(device("192.168.1.2", DeviceCategory::Router));
        result.finish(ScanStatus::Completed, Duration::from_secs(3));

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"192.168.1.0/24\""));
        let back: ScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scan_id, result.scan_id);
        assert_eq!(back.devices, result.devices);
        assert_eq!(back.count_by_category()[&DeviceCategory::Router], 2);
    }
}
