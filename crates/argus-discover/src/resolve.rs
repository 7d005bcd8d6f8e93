//! Link-layer and name resolution for a live host.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use crate::arp::ArpResolver;
use crate::hostname::HostnameResolver;

/// What could be learned about a host's identity. Either part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub mac: Option<String>,
    pub hostname: Option<String>,
}

/// Runs the MAC and hostname lookups for one address side by side, each
/// bounded by the same timeout.
#[derive(Clone)]
pub struct AddressResolver {
    arp: Arc<dyn ArpResolver>,
    hostnames: Arc<dyn HostnameResolver>,
    timeout: Duration,
}

impl AddressResolver {
    pub fn new(
        arp: Arc<dyn ArpResolver>,
        hostnames: Arc<dyn HostnameResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            arp,
            hostnames,
            timeout,
        }
    }

    pub async fn resolve(&self, ip: Ipv4Addr) -> ResolvedAddress {
        let mac = async {
            tokio::time::timeout(self.timeout, self.arp.lookup_mac(ip, self.timeout))
                .await
                .ok()
                .flatten()
        };
        let hostname = async {
            tokio::time::timeout(
                self.timeout,
                self.hostnames.resolve_hostname(ip, self.timeout),
            )
            .await
            .ok()
            .flatten()
        };

        let (mac, hostname) = tokio::join!(mac, hostname);
        ResolvedAddress { mac, hostname }
    }
}
