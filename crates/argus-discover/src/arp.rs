//! MAC address lookup through the OS neighbour (ARP) table.
//!
//! The table is read with whatever utility the platform ships and the text
//! output is searched for the queried address. Three layouts are handled:
//!
//! ```text
//! Linux   192.168.1.1 dev eth0 lladdr 3c:84:6a:12:34:56 REACHABLE
//! macOS   ? (192.168.1.1) at 3c:84:6a:12:34:56 on en0 ifscope [ethernet]
//! Windows   192.168.1.1           3c-84-6a-12-34-56     dynamic
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::platform::{self, Platform};

/// Looks up the link-layer address of a host.
#[async_trait]
pub trait ArpResolver: Send + Sync {
    /// Uppercase colon-separated MAC, or `None` when the table has no
    /// complete entry for `ip`.
    async fn lookup_mac(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String>;
}

/// Reads the neighbour table with the platform's own tools.
pub struct SystemArpResolver {
    platform: Platform,
}

impl SystemArpResolver {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Commands to try in order.
    pub fn commands(&self, ip: Ipv4Addr) -> Vec<(&'static str, Vec<String>)> {
        let ip = ip.to_string();
        match self.platform {
            Platform::Linux => vec![
                ("ip", vec!["neigh".into(), "show".into(), ip.clone()]),
                ("arp", vec!["-n".into(), ip]),
            ],
            Platform::Bsd => vec![("arp", vec!["-n".into(), ip])],
            Platform::Windows => vec![("arp", vec!["-a".into(), ip])],
        }
    }
}

#[async_trait]
impl ArpResolver for SystemArpResolver {
    async fn lookup_mac(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String> {
        let found = lookup_with(&self.commands(ip), ip, timeout).await;
        if found.is_none() {
            tracing::debug!(ip = %ip, "No neighbour table entry");
        }
        found
    }
}

/// Try each command in turn. The commands share `timeout`, so a hung first
/// tool still leaves the next one its share.
async fn lookup_with(
    commands: &[(&str, Vec<String>)],
    ip: Ipv4Addr,
    timeout: Duration,
) -> Option<String> {
    let started = Instant::now();
    for (attempt, (program, args)) in commands.iter().enumerate() {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            break;
        }
        let limit = platform::time_share(remaining, commands.len() - attempt);
        let Some(stdout) = platform::stdout_of(program, args, limit).await else {
            continue;
        };
        if let Some(mac) = parse_mac_for_ip(&stdout, ip) {
            return Some(mac);
        }
    }
    None
}

/// Find the MAC address listed for `ip` in neighbour-table output.
pub fn parse_mac_for_ip(output: &str, ip: Ipv4Addr) -> Option<String> {
    let wanted = ip.to_string();
    output
        .lines()
        .filter(|line| line_mentions_ip(line, &wanted))
        .find_map(|line| line.split_whitespace().find_map(normalize_mac))
}

/// True when the line names the address as a whole token, bare or in
/// parentheses, so `10.0.0.1` does not match `10.0.0.12`.
fn line_mentions_ip(line: &str, ip: &str) -> bool {
    line.split_whitespace()
        .any(|token| token.trim_matches(|c| c == '(' || c == ')') == ip)
}

/// Normalize `3c-84-6a-1-2-3` or `3C:84:6A:01:02:03` to `3C:84:6A:01:02:03`.
///
/// Returns `None` for anything that is not six 1-2 digit hex groups, and for
/// the all-zero address some tables use for incomplete entries.
pub fn normalize_mac(token: &str) -> Option<String> {
    let groups: Vec<&str> = token.split([':', '-']).collect();
    if groups.len() != 6 {
        return None;
    }

    let mut octets = [0u8; 6];
    for (octet, group) in octets.iter_mut().zip(&groups) {
        if group.is_empty() || group.len() > 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        *octet = u8::from_str_radix(group, 16).ok()?;
    }

    if octets.iter().all(|&o| o == 0) {
        return None;
    }

    Some(
        octets
            .iter()
            .map(|o| format!("{o:02X}"))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
