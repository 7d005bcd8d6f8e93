//! Which IPv4 ranges a scan covers.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use argus_core::NetworkRange;
use ipnet::Ipv4Net;
use pnet::datalink;
use pnet::ipnetwork::IpNetwork;

/// Common private ranges used when no interface yields anything scannable.
pub const DEFAULT_FALLBACK_RANGES: [&str; 3] = ["192.168.0.0/24", "192.168.1.0/24", "10.0.0.0/24"];

/// Produces the ranges for one scan. Never returns an empty list.
pub trait RangeResolver: Send + Sync {
    fn resolve(&self) -> Vec<NetworkRange>;
}

/// Derives ranges from the host's active, non-loopback IPv4 interfaces.
pub struct InterfaceRangeResolver {
    fallback: Vec<NetworkRange>,
}

impl InterfaceRangeResolver {
    pub fn new(fallback: Vec<NetworkRange>) -> Self {
        Self { fallback }
    }
}

impl RangeResolver for InterfaceRangeResolver {
    fn resolve(&self) -> Vec<NetworkRange> {
        let addresses = datalink::interfaces()
            .into_iter()
            .filter(|iface| iface.is_up() && !iface.is_loopback())
            .flat_map(|iface| {
                let name = iface.name.clone();
                iface.ips.into_iter().filter_map(move |net| match net {
                    IpNetwork::V4(v4) => Some((name.clone(), v4.ip(), v4.prefix())),
                    IpNetwork::V6(_) => None,
                })
            });

        self.resolve_from(addresses)
    }
}

impl InterfaceRangeResolver {
    /// Ranges for the given (interface, address, prefix) triples, or the
    /// fallback ranges when none of them is usable.
    pub fn resolve_from<I>(&self, addresses: I) -> Vec<NetworkRange>
    where
        I: IntoIterator<Item = (String, Ipv4Addr, u8)>,
    {
        let ranges = ranges_from_addresses(addresses);
        if ranges.is_empty() {
            tracing::warn!("No usable IPv4 interface found, scanning fallback ranges");
            return fallback_or_default(&self.fallback);
        }

        for range in &ranges {
            tracing::info!(cidr = %range, interface = %range.interface, "Resolved scan range");
        }
        ranges
    }
}

/// Scans exactly the configured ranges.
pub struct StaticRangeResolver {
    ranges: Vec<NetworkRange>,
}

impl StaticRangeResolver {
    pub fn new(ranges: Vec<NetworkRange>) -> Self {
        Self { ranges }
    }
}

impl RangeResolver for StaticRangeResolver {
    fn resolve(&self) -> Vec<NetworkRange> {
        fallback_or_default(&self.ranges)
    }
}

/// Turn (interface, address, prefix) triples into distinct network ranges.
///
/// Loopback addresses and host-only /32 networks are skipped. A network seen
/// on several interfaces is kept once, under the first interface.
pub fn ranges_from_addresses<I>(addresses: I) -> Vec<NetworkRange>
where
    I: IntoIterator<Item = (String, Ipv4Addr, u8)>,
{
    let mut seen = HashSet::new();
    let mut ranges = Vec::new();

    for (interface, ip, prefix) in addresses {
        if ip.is_loopback() || ip.is_unspecified() || prefix >= 32 {
            continue;
        }
        let Ok(net) = Ipv4Net::new(ip, prefix) else {
            tracing::debug!(interface = %interface, ip = %ip, prefix, "Skipping invalid prefix");
            continue;
        };
        let range = NetworkRange::new(net, interface);
        if seen.insert(range.network) {
            ranges.push(range);
        }
    }

    ranges
}

/// Host addresses to probe in `range`, at most `max_hosts` of them.
pub fn scan_addresses(range: &NetworkRange, max_hosts: usize) -> impl Iterator<Item = Ipv4Addr> {
    if range.host_count() > max_hosts as u64 {
        tracing::warn!(
            cidr = %range,
            hosts = range.host_count(),
            limit = max_hosts,
            "Range exceeds host limit, scanning the first addresses only"
        );
    }
    range.hosts().take(max_hosts)
}

fn fallback_or_default(ranges: &[NetworkRange]) -> Vec<NetworkRange> {
    if !ranges.is_empty() {
        return ranges.to_vec();
    }
    DEFAULT_FALLBACK_RANGES
        .iter()
        .filter_map(|cidr| NetworkRange::parse(cidr, "fallback").ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(name: &str, ip: [u8; 4], prefix: u8) -> (String, Ipv4Addr, u8) {
        (name.to_string(), Ipv4Addr::from(ip), prefix)
    }

    #[test]
    fn computes_containing_network() {
        let ranges = ranges_from_addresses(vec![triple("eth0", [192, 168, 1, 57], 24)]);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].to_string(), "192.168.1.0/24");
        assert_eq!(ranges[0].interface, "eth0");
    }

    #[test]
    fn skips_loopback_and_host_routes() {
        let ranges = ranges_from_addresses(vec![
            triple("lo", [127, 0, 0, 1], 8),
            triple("tun0", [10, 8, 0, 2], 32),
            triple("wlan0", [172, 16, 4, 9], 22),
        ]);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].to_string(), "172.16.4.0/22");
    }

    #[test]
    fn duplicate_networks_are_reported_once() {
        let ranges = ranges_from_addresses(vec![
            triple("eth0", [10, 0, 0, 5], 24),
            triple("eth0.100", [10, 0, 0, 6], 24),
        ]);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].interface, "eth0");
    }

    #[test]
    fn empty_static_ranges_fall_back_to_defaults() {
        let ranges = StaticRangeResolver::new(vec![]).resolve();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.interface == "fallback"));
    }

    #[test]
    fn no_usable_interface_uses_configured_fallback() {
        let fallback = vec![NetworkRange::parse("172.31.7.0/24", "fallback").unwrap()];
        let resolver = InterfaceRangeResolver::new(fallback.clone());

        assert_eq!(resolver.resolve_from(Vec::new()), fallback);
        assert_eq!(
            resolver.resolve_from(vec![
                triple("lo", [127, 0, 0, 1], 8),
                triple("tun0", [10, 8, 0, 2], 32),
            ]),
            fallback
        );
    }

    #[test]
    fn usable_interface_wins_over_fallback() {
        let fallback = vec![NetworkRange::parse("172.31.7.0/24", "fallback").unwrap()];
        let resolver = InterfaceRangeResolver::new(fallback);

        let ranges = resolver.resolve_from(vec![triple("eth0", [192, 168, 50, 3], 24)]);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].to_string(), "192.168.50.0/24");
    }

    #[test]
    fn empty_fallback_config_uses_defaults() {
        let ranges = InterfaceRangeResolver::new(vec![]).resolve_from(Vec::new());
        assert_eq!(ranges.len(), DEFAULT_FALLBACK_RANGES.len());
    }

    #[test]
    fn interface_resolution_is_never_empty() {
        // Whatever interfaces the test machine has, the result is non-empty.
        let ranges = InterfaceRangeResolver::new(vec![]).resolve();
        assert!(!ranges.is_empty());
    }

    #[test]
    fn static_ranges_are_kept_as_given() {
        let given = vec![NetworkRange::parse("172.20.0.0/28", "configured").unwrap()];
        assert_eq!(StaticRangeResolver::new(given.clone()).resolve(), given);
    }

    #[test]
    fn scan_addresses_caps_large_ranges() {
        let range = NetworkRange::parse("10.0.0.0/16", "eth0").unwrap();
        let hosts: Vec<Ipv4Addr> = scan_addresses(&range, 300).collect();
        assert_eq!(hosts.len(), 300);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 0, 0, 1));

        let small = NetworkRange::parse("10.0.0.0/29", "eth0").unwrap();
        assert_eq!(scan_addresses(&small, 300).count(), 6);
    }
}
