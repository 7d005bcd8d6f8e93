//! Scan orchestration.
//!
//! Resolves the ranges, fans every usable address out to a bounded pool of
//! host tasks, and aggregates the devices those tasks send back into one
//! [`ScanResult`]. A host task pings its address and, if it answers, resolves
//! MAC/hostname and scans ports concurrently before classifying the host.
//!
//! Two semaphores bound the host level: one per range and one global. Both
//! permits are taken *before* a task is spawned, so the number of live host
//! tasks never exceeds the smaller limit. The port level is bounded inside the
//! [`PortScanner`].

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use argus_core::{Device, HostStatus, NetworkRange, ScanEvent, ScanId, ScanResult, ScanStatus};
use chrono::Utc;
use tokio::sync::{mpsc, AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::arp::{ArpResolver, SystemArpResolver};
use crate::classify::classify;
use crate::config::DiscoverConfig;
use crate::error::Result;
use crate::hostname::{HostnameResolver, SystemHostnameResolver};
use crate::platform::Platform;
use crate::ports::{PortScanner, TcpPortScanner};
use crate::probe::{Pinger, SystemPinger};
use crate::range::{scan_addresses, InterfaceRangeResolver, RangeResolver, StaticRangeResolver};
use crate::resolve::AddressResolver;

/// Timeouts, pool sizes and the candidate port set for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub candidate_ports: Vec<u16>,
    pub ping_timeout: Duration,
    pub port_timeout: Duration,
    pub resolve_timeout: Duration,
    pub max_concurrent_hosts: usize,
    pub max_hosts_in_flight_per_range: usize,
    pub max_hosts_per_range: usize,
    pub scan_timeout: Option<Duration>,
}

impl From<&DiscoverConfig> for ScanOptions {
    fn from(config: &DiscoverConfig) -> Self {
        Self {
            candidate_ports: config.candidate_ports.clone(),
            ping_timeout: config.ping_timeout(),
            port_timeout: config.port_timeout(),
            resolve_timeout: config.resolve_timeout(),
            max_concurrent_hosts: config.max_concurrent_hosts.max(1),
            max_hosts_in_flight_per_range: config.max_hosts_in_flight_per_range.max(1),
            max_hosts_per_range: config.max_hosts_per_range.max(1),
            scan_timeout: config.scan_timeout(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from(&DiscoverConfig::default())
    }
}

/// The probe capabilities a scan runs with.
#[derive(Clone)]
pub struct Probes {
    pub pinger: Arc<dyn Pinger>,
    pub arp: Arc<dyn ArpResolver>,
    pub hostnames: Arc<dyn HostnameResolver>,
    pub ports: Arc<dyn PortScanner>,
}

impl Probes {
    /// OS-backed probes using the syntax of `platform`.
    pub fn system(config: &DiscoverConfig, platform: Platform) -> Self {
        Self {
            pinger: Arc::new(SystemPinger::new(&config.ping_path, platform)),
            arp: Arc::new(SystemArpResolver::new(platform)),
            hostnames: Arc::new(SystemHostnameResolver::new(
                platform,
                config.netbios_fallback,
            )),
            ports: Arc::new(TcpPortScanner::new(
                config.port_workers,
                config.max_open_connections,
            )),
        }
    }
}

/// Everything a host task needs, shared read-only between tasks.
struct HostProbe {
    pinger: Arc<dyn Pinger>,
    resolver: AddressResolver,
    ports: Arc<dyn PortScanner>,
    candidate_ports: Vec<u16>,
    ping_timeout: Duration,
    port_timeout: Duration,
}

impl HostProbe {
    /// Probe one address. `None` means the host did not answer the liveness
    /// probe and must not be recorded.
    async fn run(&self, ip: Ipv4Addr) -> Option<Device> {
        let rtt = self.pinger.ping(ip, self.ping_timeout).await?;

        let (resolved, open) = tokio::join!(
            self.resolver.resolve(ip),
            self.ports
                .scan_ports(ip, &self.candidate_ports, self.port_timeout)
        );

        let mut open_ports: Vec<u16> = open
            .into_iter()
            .filter(|p| self.candidate_ports.contains(p))
            .collect();
        open_ports.sort_unstable();
        open_ports.dedup();

        let category = classify(
            resolved.hostname.as_deref(),
            resolved.mac.as_deref(),
            &open_ports,
        );

        Some(Device {
            ip: ip.to_string(),
            hostname: resolved.hostname,
            mac_address: resolved.mac,
            category,
            status: HostStatus::Alive,
            open_ports,
            discovered_at: Utc::now(),
            latency_ms: Some(rtt.as_secs_f64() * 1000.0),
        })
    }
}

/// How the dispatch loop ended.
struct DispatchSummary {
    hosts_probed: u64,
    /// Dispatch stopped early or host tasks were abandoned mid-probe.
    interrupted: bool,
    failed_hosts: u64,
    error: Option<AcquireError>,
}

/// Runs discovery scans. Holds configuration and probe capabilities only;
/// each run owns its own result.
pub struct Orchestrator {
    ranges: Arc<dyn RangeResolver>,
    probe: Arc<HostProbe>,
    options: ScanOptions,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl Orchestrator {
    pub fn new(options: ScanOptions, ranges: Arc<dyn RangeResolver>, probes: Probes) -> Self {
        let probe = HostProbe {
            pinger: probes.pinger,
            resolver: AddressResolver::new(probes.arp, probes.hostnames, options.resolve_timeout),
            ports: probes.ports,
            candidate_ports: options.candidate_ports.clone(),
            ping_timeout: options.ping_timeout,
            port_timeout: options.port_timeout,
        };
        Self {
            ranges,
            probe: Arc::new(probe),
            options,
            events: None,
        }
    }

    /// Orchestrator with OS probes for the running platform. Explicit targets
    /// replace interface discovery.
    pub fn from_config(config: &DiscoverConfig) -> Result<Self> {
        config.validate()?;
        let targets = config.target_ranges()?;
        let ranges: Arc<dyn RangeResolver> = if targets.is_empty() {
            Arc::new(InterfaceRangeResolver::new(
                config.fallback_network_ranges()?,
            ))
        } else {
            Arc::new(StaticRangeResolver::new(targets))
        };
        let probes = Probes::system(config, Platform::current());
        Ok(Self::new(ScanOptions::from(config), ranges, probes))
    }

    /// Send lifecycle events to `tx`. A dropped receiver is ignored.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Run a full scan to completion (or until the scan timeout).
    pub async fn run_scan(&self) -> ScanResult {
        self.run_scan_until(CancellationToken::new()).await
    }

    /// Run a scan that stops early when `cancel` fires, returning what was
    /// found so far.
    pub async fn run_scan_until(&self, cancel: CancellationToken) -> ScanResult {
        self.execute(ScanId::new(), cancel).await
    }

    /// Start a scan in the background.
    pub fn spawn(self: &Arc<Self>) -> ScanHandle {
        let scan_id = ScanId::new();
        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move { this.execute(scan_id, token).await });
        ScanHandle {
            scan_id,
            cancel,
            join,
        }
    }

    async fn execute(&self, scan_id: ScanId, cancel: CancellationToken) -> ScanResult {
        let started = Instant::now();
        let ranges = self.ranges.resolve();
        let mut result = ScanResult::begin(scan_id, ranges.clone());

        let max_hosts = self.options.max_hosts_per_range as u64;
        let hosts_planned: u64 = ranges.iter().map(|r| r.host_count().min(max_hosts)).sum();

        tracing::info!(
            scan_id = %scan_id,
            ranges = ranges.len(),
            hosts_planned,
            "Starting discovery scan"
        );
        self.emit(ScanEvent::ScanStarted {
            scan_id,
            ranges: ranges.iter().map(|r| r.to_string()).collect(),
            hosts_planned,
        });

        if hosts_planned == 0 {
            result.fail("no scannable addresses in resolved ranges", started.elapsed());
            self.report_finished(&result);
            return result;
        }

        // The timeout cancels a child token so an external cancel can still be
        // told apart from a timeout.
        let scan_token = cancel.child_token();
        let timer = self.options.scan_timeout.map(|limit| {
            let token = scan_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                token.cancel();
            })
        });

        let (tx, mut rx) = mpsc::channel::<Device>(self.options.max_concurrent_hosts);
        let dispatch = self.dispatch(&ranges, &scan_token, tx);
        let collect = async {
            while let Some(device) = rx.recv().await {
                self.emit(ScanEvent::HostDiscovered {
                    scan_id,
                    ip: device.ip.clone(),
                    category: device.category,
                });
                result.record(device);
            }
        };
        let (summary, ()) = tokio::join!(dispatch, collect);

        if let Some(timer) = timer {
            timer.abort();
        }

        result.hosts_probed = summary.hosts_probed;
        if summary.failed_hosts > 0 {
            tracing::warn!(
                scan_id = %scan_id,
                failed_hosts = summary.failed_hosts,
                "Some host probes failed and were omitted"
            );
        }

        let elapsed = started.elapsed();
        match summary.error {
            Some(e) => result.fail(format!("host dispatch failed: {e}"), elapsed),
            None => {
                let status = if !summary.interrupted {
                    ScanStatus::Completed
                } else if cancel.is_cancelled() {
                    ScanStatus::Cancelled
                } else {
                    ScanStatus::TimedOut
                };
                result.finish(status, elapsed);
            }
        }

        self.report_finished(&result);
        result
    }

    /// Spawn one task per address under the host-level bounds, then wait for
    /// all of them. Devices travel back over `tx`.
    async fn dispatch(
        &self,
        ranges: &[NetworkRange],
        token: &CancellationToken,
        tx: mpsc::Sender<Device>,
    ) -> DispatchSummary {
        let global = Arc::new(Semaphore::new(self.options.max_concurrent_hosts));
        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut summary = DispatchSummary {
            hosts_probed: 0,
            interrupted: false,
            failed_hosts: 0,
            error: None,
        };

        'ranges: for range in ranges {
            let per_range = Arc::new(Semaphore::new(self.options.max_hosts_in_flight_per_range));

            for ip in scan_addresses(range, self.options.max_hosts_per_range) {
                let acquired = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permits = acquire_host_permits(&per_range, &global) => Some(permits),
                };
                let permits = match acquired {
                    None => {
                        summary.interrupted = true;
                        break 'ranges;
                    }
                    Some(Err(e)) => {
                        summary.error = Some(e);
                        break 'ranges;
                    }
                    Some(Ok(permits)) => permits,
                };

                summary.hosts_probed += 1;
                let probe = Arc::clone(&self.probe);
                let tx = tx.clone();
                let token = token.clone();
                tasks.spawn(async move {
                    let _permits = permits;
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => return true,
                        device = probe.run(ip) => device,
                    };
                    if let Some(device) = outcome {
                        let _ = tx.send(device).await;
                    }
                    false
                });

                while let Some(joined) = tasks.try_join_next() {
                    tally(&mut summary, joined);
                }
            }
        }

        drop(tx);
        while let Some(joined) = tasks.join_next().await {
            tally(&mut summary, joined);
        }
        summary
    }

    fn report_finished(&self, result: &ScanResult) {
        tracing::info!(
            scan_id = %result.scan_id,
            status = %result.status,
            devices = result.devices.len(),
            hosts_probed = result.hosts_probed,
            duration_ms = result.duration_ms.unwrap_or_default(),
            "Discovery scan finished"
        );
        self.emit(ScanEvent::ScanFinished {
            scan_id: result.scan_id,
            status: result.status,
            devices_found: result.devices.len() as u32,
            duration_ms: result.duration_ms.unwrap_or_default(),
        });
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

async fn acquire_host_permits(
    per_range: &Arc<Semaphore>,
    global: &Arc<Semaphore>,
) -> std::result::Result<(OwnedSemaphorePermit, OwnedSemaphorePermit), AcquireError> {
    let range_permit = Arc::clone(per_range).acquire_owned().await?;
    let global_permit = Arc::clone(global).acquire_owned().await?;
    Ok((range_permit, global_permit))
}

/// Account for one finished host task. A panicked task only loses its host.
fn tally(summary: &mut DispatchSummary, joined: std::result::Result<bool, JoinError>) {
    match joined {
        Ok(abandoned) => summary.interrupted |= abandoned,
        Err(e) => {
            summary.failed_hosts += 1;
            tracing::warn!(error = %e, "Host probe task failed");
        }
    }
}

/// A scan running in the background.
pub struct ScanHandle {
    scan_id: ScanId,
    cancel: CancellationToken,
    join: JoinHandle<ScanResult>,
}

impl ScanHandle {
    pub fn scan_id(&self) -> ScanId {
        self.scan_id
    }

    /// Stop issuing probes; `wait` then returns the partial result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<ScanResult> {
        Ok(self.join.await?)
    }
}
