//! TCP connect probing of a small, fixed candidate port set.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Ports checked on every live host unless configured otherwise.
pub const DEFAULT_CANDIDATE_PORTS: [u16; 15] = [
    22, 23, 25, 53, 80, 110, 139, 143, 443, 993, 995, 1723, 3389, 5900, 8080,
];

/// Checks which candidate ports accept a TCP connection.
#[async_trait]
pub trait PortScanner: Send + Sync {
    /// Returns the ascending subset of `candidates` that accepted a
    /// connection within `timeout`. Never fails; unreachable means closed.
    async fn scan_ports(&self, ip: Ipv4Addr, candidates: &[u16], timeout: Duration) -> Vec<u16>;
}

/// Plain TCP connect scanner.
///
/// Concurrent connects are bounded twice: `workers` per host, and a
/// connection budget shared by every host scanned through this value.
pub struct TcpPortScanner {
    workers: usize,
    connections: Arc<Semaphore>,
}

impl TcpPortScanner {
    pub fn new(workers: usize, max_open_connections: usize) -> Self {
        Self::with_budget(workers, Arc::new(Semaphore::new(max_open_connections.max(1))))
    }

    /// Scanner drawing on an existing connection budget.
    pub fn with_budget(workers: usize, connections: Arc<Semaphore>) -> Self {
        Self {
            workers: workers.max(1),
            connections,
        }
    }
}

#[async_trait]
impl PortScanner for TcpPortScanner {
    async fn scan_ports(&self, ip: Ipv4Addr, candidates: &[u16], timeout: Duration) -> Vec<u16> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        let unique: BTreeSet<u16> = candidates.iter().copied().collect();
        for port in unique {
            let semaphore = Arc::clone(&semaphore);
            let connections = Arc::clone(&self.connections);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let _connection = connections.acquire_owned().await.ok()?;
                probe_port(SocketAddr::from((ip, port)), timeout)
                    .await
                    .then_some(port)
            });
        }

        let mut open = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(port)) => open.push(port),
                Ok(None) => {}
                Err(e) => tracing::debug!(ip = %ip, error = %e, "Port probe task failed"),
            }
        }

        open.sort_unstable();
        tracing::debug!(ip = %ip, open = ?open, "Port scan complete");
        open
    }
}

/// One TCP connect attempt. Refused, unreachable and timed out all read as
/// closed.
async fn probe_port(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        // Bind and drop to get a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn finds_listening_port_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let scanner = TcpPortScanner::new(4, 64);
        let open = scanner
            .scan_ports(
                Ipv4Addr::LOCALHOST,
                &[closed, open_port],
                Duration::from_millis(500),
            )
            .await;

        assert_eq!(open, vec![open_port]);
    }

    #[tokio::test]
    async fn results_stay_within_candidates() {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port_a = a.local_addr().unwrap().port();
        let port_b = b.local_addr().unwrap().port();

        // Only `port_a` is a candidate, `port_b` is open but must not show up.
        let scanner = TcpPortScanner::new(1, 64);
        let candidates = [port_a, port_a];
        let open = scanner
            .scan_ports(Ipv4Addr::LOCALHOST, &candidates, Duration::from_millis(500))
            .await;

        assert_eq!(open, vec![port_a]);
        assert!(!open.contains(&port_b));
        assert!(open.iter().all(|p| candidates.contains(p)));
    }

    #[tokio::test]
    async fn no_open_ports_is_empty_not_error() {
        let closed = closed_port().await;
        let scanner = TcpPortScanner::new(20, 64);
        let open = scanner
            .scan_ports(Ipv4Addr::LOCALHOST, &[closed], Duration::from_millis(200))
            .await;
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn connects_wait_for_the_shared_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();

        let budget = Arc::new(Semaphore::new(1));
        let scanner = Arc::new(TcpPortScanner::with_budget(4, Arc::clone(&budget)));

        // Another host's connect holds the only slot.
        let held = Arc::clone(&budget).acquire_owned().await.unwrap();
        let scan = {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move {
                scanner
                    .scan_ports(Ipv4Addr::LOCALHOST, &[open_port], Duration::from_millis(500))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!scan.is_finished());

        drop(held);
        assert_eq!(scan.await.unwrap(), vec![open_port]);
        assert_eq!(budget.available_permits(), 1);
    }

    #[test]
    fn default_candidates_are_unique() {
        let unique: BTreeSet<u16> = DEFAULT_CANDIDATE_PORTS.iter().copied().collect();
        assert_eq!(unique.len(), DEFAULT_CANDIDATE_PORTS.len());
    }
}
