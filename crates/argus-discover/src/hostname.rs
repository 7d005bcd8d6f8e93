//! Hostname resolution: reverse DNS, then NetBIOS node status.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::platform::{self, Platform};

/// Resolves a human-readable name for a host.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve_hostname(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String>;
}

/// Reverse DNS through the system resolver.
pub struct ReverseDnsResolver;

#[async_trait]
impl HostnameResolver for ReverseDnsResolver {
    async fn resolve_hostname(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String> {
        // getnameinfo blocks; keep it off the async workers.
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)));
        match tokio::time::timeout(timeout, lookup).await {
            Ok(Ok(Ok(name))) => clean_dns_name(&name, ip),
            Ok(Ok(Err(e))) => {
                tracing::trace!(ip = %ip, error = %e, "Reverse DNS lookup failed");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(ip = %ip, error = %e, "Reverse DNS task failed");
                None
            }
            Err(_) => {
                tracing::debug!(ip = %ip, "Reverse DNS lookup timed out");
                None
            }
        }
    }
}

/// NetBIOS node-status query: `nbtstat` on Windows, Samba's `nmblookup`
/// elsewhere.
pub struct NetbiosResolver {
    platform: Platform,
}

impl NetbiosResolver {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn command(&self, ip: Ipv4Addr) -> (&'static str, Vec<String>) {
        let program = if self.platform.is_windows() {
            "nbtstat"
        } else {
            "nmblookup"
        };
        (program, vec!["-A".to_string(), ip.to_string()])
    }
}

#[async_trait]
impl HostnameResolver for NetbiosResolver {
    async fn resolve_hostname(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String> {
        let (program, args) = self.command(ip);
        let stdout = platform::stdout_of(program, &args, timeout).await?;
        parse_netbios_name(&stdout)
    }
}

/// Reverse DNS first, then NetBIOS when a fallback is configured.
///
/// Both steps share one time budget: DNS gets half of it so a stalled PTR
/// lookup still leaves the fallback room to answer within `timeout`.
pub struct SystemHostnameResolver {
    dns: Arc<dyn HostnameResolver>,
    netbios: Option<Arc<dyn HostnameResolver>>,
}

impl SystemHostnameResolver {
    /// Windows always falls back to NetBIOS; elsewhere `netbios_fallback`
    /// decides.
    pub fn new(platform: Platform, netbios_fallback: bool) -> Self {
        let netbios: Option<Arc<dyn HostnameResolver>> = (platform.is_windows()
            || netbios_fallback)
            .then(|| Arc::new(NetbiosResolver::new(platform)) as Arc<dyn HostnameResolver>);
        Self::with_lookups(Arc::new(ReverseDnsResolver), netbios)
    }

    pub fn with_lookups(
        dns: Arc<dyn HostnameResolver>,
        netbios: Option<Arc<dyn HostnameResolver>>,
    ) -> Self {
        Self { dns, netbios }
    }

    pub fn has_fallback(&self) -> bool {
        self.netbios.is_some()
    }
}

#[async_trait]
impl HostnameResolver for SystemHostnameResolver {
    async fn resolve_hostname(&self, ip: Ipv4Addr, timeout: Duration) -> Option<String> {
        let Some(netbios) = &self.netbios else {
            return bounded(self.dns.as_ref(), ip, timeout).await;
        };

        let started = Instant::now();
        if let Some(name) = bounded(self.dns.as_ref(), ip, platform::time_share(timeout, 2)).await {
            return Some(name);
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return None;
        }
        bounded(netbios.as_ref(), ip, remaining).await
    }
}

/// Run one lookup under its own deadline.
async fn bounded(lookup: &dyn HostnameResolver, ip: Ipv4Addr, limit: Duration) -> Option<String> {
    tokio::time::timeout(limit, lookup.resolve_hostname(ip, limit))
        .await
        .ok()
        .flatten()
}

/// Strip the trailing root dot; an answer that is just the address again
/// counts as no answer.
fn clean_dns_name(name: &str, ip: Ipv4Addr) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        return None;
    }
    Some(name.to_string())
}

/// First unique `<00>` (workstation) name in `nbtstat -A` / `nmblookup -A`
/// output.
///
/// ```text
/// nmblookup:   OFFICE-PC       <00> -         B <ACTIVE>
/// nbtstat:     OFFICE-PC      <00>  UNIQUE      Registered
/// ```
pub fn parse_netbios_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        if line.contains("GROUP") {
            return None;
        }
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?;
        (tokens.next()? == "<00>").then(|| name.to_string())
    })
}
