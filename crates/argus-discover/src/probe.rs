//! Host liveness probing through the platform ping utility.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::platform::{self, Platform};

/// Extra time a ping process gets on top of its own reply timeout to start
/// up and exit before it is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(1);

/// Liveness check for a single address.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Round-trip time of a single echo, or `None` if the host did not answer
    /// within `timeout` for any reason.
    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> Option<Duration>;

    async fn is_alive(&self, ip: Ipv4Addr, timeout: Duration) -> bool {
        self.ping(ip, timeout).await.is_some()
    }
}

/// Runs the OS `ping` binary and looks only at its exit code.
pub struct SystemPinger {
    ping_path: String,
    platform: Platform,
}

impl SystemPinger {
    pub fn new(ping_path: &str, platform: Platform) -> Self {
        Self {
            ping_path: ping_path.to_string(),
            platform,
        }
    }

    /// Arguments for one echo request to `ip`.
    pub fn ping_args(&self, ip: Ipv4Addr, timeout: Duration) -> Vec<String> {
        let millis = timeout.as_millis().max(1);
        match self.platform {
            // iputils takes whole seconds.
            Platform::Linux => {
                let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
                vec![
                    "-c".to_string(),
                    "1".to_string(),
                    "-W".to_string(),
                    secs.to_string(),
                    ip.to_string(),
                ]
            }
            Platform::Bsd => vec![
                "-c".to_string(),
                "1".to_string(),
                "-W".to_string(),
                millis.to_string(),
                ip.to_string(),
            ],
            Platform::Windows => vec![
                "-n".to_string(),
                "1".to_string(),
                "-w".to_string(),
                millis.to_string(),
                ip.to_string(),
            ],
        }
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> Option<Duration> {
        let args = self.ping_args(ip, timeout);
        let start = Instant::now();
        let output = platform::run_with_timeout(&self.ping_path, &args, timeout + PROCESS_GRACE).await?;
        let elapsed = start.elapsed();

        if output.status.success() {
            Some(elapsed)
        } else {
            tracing::trace!(ip = %ip, code = ?output.status.code(), "No echo reply");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    #[test]
    fn linux_args_use_whole_seconds() {
        let pinger = SystemPinger::new("ping", Platform::Linux);
        assert_eq!(
            pinger.ping_args(IP, Duration::from_millis(1000)),
            vec!["-c", "1", "-W", "1", "192.168.1.20"]
        );
        // Sub-second timeouts round up rather than becoming "0" (wait forever).
        assert_eq!(
            pinger.ping_args(IP, Duration::from_millis(300)),
            vec!["-c", "1", "-W", "1", "192.168.1.20"]
        );
        assert_eq!(
            pinger.ping_args(IP, Duration::from_millis(2500)),
            vec!["-c", "1", "-W", "3", "192.168.1.20"]
        );
    }

    #[test]
    fn bsd_args_use_milliseconds() {
        let pinger = SystemPinger::new("ping", Platform::Bsd);
        assert_eq!(
            pinger.ping_args(IP, Duration::from_millis(1000)),
            vec!["-c", "1", "-W", "1000", "192.168.1.20"]
        );
    }

    #[test]
    fn windows_args() {
        let pinger = SystemPinger::new("ping", Platform::Windows);
        assert_eq!(
            pinger.ping_args(IP, Duration::from_millis(750)),
            vec!["-n", "1", "-w", "750", "192.168.1.20"]
        );
    }

    #[tokio::test]
    async fn missing_binary_means_not_alive() {
        let pinger = SystemPinger::new("argus-no-such-ping", Platform::current());
        assert!(
            !pinger
                .is_alive(Ipv4Addr::LOCALHOST, Duration::from_millis(200))
                .await
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_decides_liveness() {
        // `true` and `false` ignore their arguments, standing in for ping.
        let up = SystemPinger::new("true", Platform::current());
        let rtt = up.ping(IP, Duration::from_millis(200)).await;
        assert!(rtt.is_some());

        let down = SystemPinger::new("false", Platform::current());
        assert!(!down.is_alive(IP, Duration::from_millis(200)).await);
    }
}
