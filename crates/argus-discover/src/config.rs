//! Configuration for the argus-discover scanner.

use std::time::Duration;

use argus_core::NetworkRange;
use serde::Deserialize;

use crate::error::{DiscoverError, Result};
use crate::ports::DEFAULT_CANDIDATE_PORTS;
use crate::range::DEFAULT_FALLBACK_RANGES;

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `argus.toml` and
/// `ARGUS_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Explicit CIDR targets. Empty means "derive from local interfaces".
    #[serde(default)]
    pub targets: Vec<String>,

    /// Ranges scanned when no usable interface is found.
    #[serde(default = "default_fallback_ranges")]
    pub fallback_ranges: Vec<String>,

    /// TCP ports checked on every live host.
    #[serde(default = "default_candidate_ports")]
    pub candidate_ports: Vec<u16>,

    /// Path to the ping binary (default: "ping").
    #[serde(default = "default_ping_path")]
    pub ping_path: String,

    #[serde(default = "default_probe_timeout_ms")]
    pub ping_timeout_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Timeout for each of the MAC and hostname lookups.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,

    /// Global ceiling on hosts probed at the same time.
    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,

    /// Per-range ceiling on hosts probed at the same time.
    #[serde(default = "default_max_hosts_in_flight_per_range")]
    pub max_hosts_in_flight_per_range: usize,

    /// Concurrent TCP connects per host.
    #[serde(default = "default_port_workers")]
    pub port_workers: usize,

    /// Concurrent TCP connects across all hosts of a scan.
    #[serde(default = "default_max_open_connections")]
    pub max_open_connections: usize,

    /// Larger ranges are truncated to this many addresses.
    #[serde(default = "default_max_hosts_per_range")]
    pub max_hosts_per_range: usize,

    /// Overall scan timeout in seconds; `None` disables it.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: Option<u64>,

    /// Try a NetBIOS name query when reverse DNS has no answer.
    #[serde(default = "default_true")]
    pub netbios_fallback: bool,

    /// Daemon mode interval between scans.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Directory for stored scan results.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

fn default_fallback_ranges() -> Vec<String> {
    DEFAULT_FALLBACK_RANGES.iter().map(|s| s.to_string()).collect()
}

fn default_candidate_ports() -> Vec<u16> {
    DEFAULT_CANDIDATE_PORTS.to_vec()
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_resolve_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_hosts() -> usize {
    64
}

fn default_max_hosts_in_flight_per_range() -> usize {
    254
}

fn default_port_workers() -> usize {
    20
}

fn default_max_open_connections() -> usize {
    256
}

fn default_max_hosts_per_range() -> usize {
    4096
}

fn default_scan_timeout_secs() -> Option<u64> {
    Some(900)
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    3600
}

fn default_store_dir() -> String {
    "./scans".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            fallback_ranges: default_fallback_ranges(),
            candidate_ports: default_candidate_ports(),
            ping_path: default_ping_path(),
            ping_timeout_ms: default_probe_timeout_ms(),
            port_timeout_ms: default_probe_timeout_ms(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            max_concurrent_hosts: default_max_concurrent_hosts(),
            max_hosts_in_flight_per_range: default_max_hosts_in_flight_per_range(),
            port_workers: default_port_workers(),
            max_open_connections: default_max_open_connections(),
            max_hosts_per_range: default_max_hosts_per_range(),
            scan_timeout_secs: default_scan_timeout_secs(),
            netbios_fallback: true,
            interval_secs: default_interval(),
            store_dir: default_store_dir(),
        }
    }
}

impl DiscoverConfig {
    /// Load `<file_prefix>.toml` (optional) overlaid with `ARGUS_DISCOVER__*`
    /// environment variables. A missing `[discover]` section yields defaults.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("ARGUS")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("discover.targets")
                    .with_list_parse_key("discover.fallback_ranges")
                    .with_list_parse_key("discover.candidate_ports")
                    .try_parsing(true),
            )
            .build()?;

        let loaded = match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => c,
            Err(config::ConfigError::NotFound(_)) => DiscoverConfig::default(),
            Err(e) => return Err(e.into()),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would stall or misdirect a scan.
    pub fn validate(&self) -> Result<()> {
        if self.candidate_ports.is_empty() {
            return Err(DiscoverError::Config(
                "candidate_ports must not be empty".to_string(),
            ));
        }
        if self.fallback_ranges.is_empty() {
            return Err(DiscoverError::Config(
                "fallback_ranges must not be empty".to_string(),
            ));
        }
        if self.candidate_ports.contains(&0) {
            return Err(DiscoverError::Config(
                "candidate_ports must not contain port 0".to_string(),
            ));
        }
        for (name, value) in [
            ("max_concurrent_hosts", self.max_concurrent_hosts),
            (
                "max_hosts_in_flight_per_range",
                self.max_hosts_in_flight_per_range,
            ),
            ("port_workers", self.port_workers),
            ("max_open_connections", self.max_open_connections),
            ("max_hosts_per_range", self.max_hosts_per_range),
        ] {
            if value == 0 {
                return Err(DiscoverError::Config(format!("{name} must be at least 1")));
            }
        }
        self.target_ranges()?;
        self.fallback_network_ranges()?;
        Ok(())
    }

    /// Parsed explicit targets.
    pub fn target_ranges(&self) -> Result<Vec<NetworkRange>> {
        parse_ranges(&self.targets, "configured")
    }

    /// Parsed fallback ranges.
    pub fn fallback_network_ranges(&self) -> Result<Vec<NetworkRange>> {
        parse_ranges(&self.fallback_ranges, "fallback")
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_ranges(cidrs: &[String], source: &str) -> Result<Vec<NetworkRange>> {
    cidrs
        .iter()
        .map(|cidr| NetworkRange::parse(cidr, source).map_err(DiscoverError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert!(config.targets.is_empty());
        assert_eq!(config.candidate_ports.len(), 15);
        assert_eq!(config.ping_timeout(), Duration::from_secs(1));
        assert_eq!(config.resolve_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_hosts_in_flight_per_range, 254);
        assert_eq!(config.port_workers, 20);
        assert_eq!(config.max_open_connections, 256);
        assert_eq!(config.scan_timeout(), Some(Duration::from_secs(900)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_fallback_ranges() {
        let ranges = DiscoverConfig::default().fallback_network_ranges().unwrap();
        let cidrs: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            cidrs,
            vec!["192.168.0.0/24", "192.168.1.0/24", "10.0.0.0/24"]
        );
        assert!(ranges.iter().all(|r| r.interface == "fallback"));
    }

    #[test]
    fn test_validate_rejects_bad_targets() {
        let config = DiscoverConfig {
            targets: vec!["10.0.0.0/24".to_string(), "10.0.0.300/24".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DiscoverError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_pools() {
        let config = DiscoverConfig {
            port_workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DiscoverError::Config(_))));

        let config = DiscoverConfig {
            candidate_ports: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DiscoverError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.toml");
        std::fs::write(
            &path,
            r#"
[discover]
targets = ["172.16.5.0/24"]
candidate_ports = [22, 9100]
ping_timeout_ms = 250
scan_timeout_secs = 60
"#,
        )
        .unwrap();

        let prefix = dir.path().join("argus");
        let config = DiscoverConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.targets, vec!["172.16.5.0/24"]);
        assert_eq!(config.candidate_ports, vec![22, 9100]);
        assert_eq!(config.ping_timeout_ms, 250);
        assert_eq!(config.scan_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.interval_secs, 3600);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("argus.toml"),
            "[discover]\nport_workers = 4\nnetbios_fallback = true\n",
        )
        .unwrap();

        std::env::set_var("ARGUS_DISCOVER__PORT_WORKERS", "7");
        std::env::set_var("ARGUS_DISCOVER__NETBIOS_FALLBACK", "false");
        let prefix = dir.path().join("argus");
        let loaded = DiscoverConfig::load(prefix.to_str().unwrap());
        std::env::remove_var("ARGUS_DISCOVER__PORT_WORKERS");
        std::env::remove_var("ARGUS_DISCOVER__NETBIOS_FALLBACK");

        let config = loaded.unwrap();
        assert_eq!(config.port_workers, 7);
        assert!(!config.netbios_fallback);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("missing");
        let config = DiscoverConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.store_dir, "./scans");
        assert_eq!(config.fallback_ranges.len(), 3);
    }
}
