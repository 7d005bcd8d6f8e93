//! Heuristic device classification.
//!
//! Maps what a scan observed about a host (hostname, MAC, open ports) to a
//! [`DeviceCategory`]. Rules are checked in a fixed order and the first match
//! wins:
//!
//! 1. router   - hostname token
//! 2. server   - three or more server-indicative ports
//! 3. printer  - printing port, or hostname token
//! 4. switch   - hostname token
//! 5. firewall - hostname token
//! 6. endpoint - everything else
//!
//! This is a heuristic, not a guarantee. Token matching is a case-insensitive
//! substring test, so short tokens such as `gw` or `sw` also match inside
//! longer words.

use argus_core::DeviceCategory;

const ROUTER_TOKENS: &[&str] = &[
    "router", "gateway", "gw", "linksys", "netgear", "tp-link", "asus",
];

const SERVER_PORTS: &[u16] = &[22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3389, 8080];

/// Minimum number of server-indicative ports for the server rule.
const SERVER_PORT_THRESHOLD: usize = 3;

const PRINTER_PORTS: &[u16] = &[515, 631, 9100];

const PRINTER_TOKENS: &[&str] = &["printer", "hp", "canon", "epson"];

const SWITCH_TOKENS: &[&str] = &["switch", "sw", "cisco"];

const FIREWALL_TOKENS: &[&str] = &["firewall", "fw", "pfsense", "fortigate", "sonicwall"];

/// Classify a host. Pure and deterministic.
///
/// The MAC address is accepted so callers pass everything they know, but no
/// rule uses it yet.
pub fn classify(hostname: Option<&str>, _mac: Option<&str>, open_ports: &[u16]) -> DeviceCategory {
    let name = hostname.map(str::to_lowercase).unwrap_or_default();

    if contains_any(&name, ROUTER_TOKENS) {
        return DeviceCategory::Router;
    }

    let server_ports = open_ports
        .iter()
        .filter(|p| SERVER_PORTS.contains(p))
        .count();
    if server_ports >= SERVER_PORT_THRESHOLD {
        return DeviceCategory::Server;
    }

    if open_ports.iter().any(|p| PRINTER_PORTS.contains(p)) || contains_any(&name, PRINTER_TOKENS)
    {
        return DeviceCategory::Printer;
    }

    if contains_any(&name, SWITCH_TOKENS) {
        return DeviceCategory::Switch;
    }

    if contains_any(&name, FIREWALL_TOKENS) {
        return DeviceCategory::Firewall;
    }

    DeviceCategory::Endpoint
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    !haystack.is_empty() && needles.iter().any(|n| haystack.contains(n))
}
