//! CLI entry point for the argus-discover network scanner.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use argus_discover::config::DiscoverConfig;
use argus_discover::orchestrator::Orchestrator;
use argus_discover::persist::{JsonScanStore, ScanStore};
use argus_discover::scheduler::{log_summary, ScanScheduler};

#[derive(Parser)]
#[command(name = "argus-discover")]
#[command(about = "Active discovery of devices on the local IPv4 networks")]
struct Cli {
    /// Range to scan in CIDR notation, e.g. 10.0.1.0/24. Repeatable.
    /// Replaces interface discovery.
    #[arg(short, long)]
    target: Vec<String>,

    /// Run a single one-shot scan and exit.
    #[arg(long)]
    once: bool,

    /// Run as daemon with scheduled scans.
    #[arg(long)]
    daemon: bool,

    /// Override the overall scan timeout (seconds).
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the finished result as JSON (one-shot mode).
    #[arg(long)]
    json: bool,

    /// Config file prefix (default: argus).
    #[arg(short, long, default_value = "argus")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    if cli.once == cli.daemon {
        anyhow::bail!("Specify exactly one of --once (one-shot scan) or --daemon (scheduled scanning)");
    }

    let mut discover_config = DiscoverConfig::load(&cli.config)?;
    if !cli.target.is_empty() {
        discover_config.targets = cli.target.clone();
    }
    if let Some(secs) = cli.timeout {
        discover_config.scan_timeout_secs = Some(secs);
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&discover_config)?);
    let store = Arc::new(JsonScanStore::new(&discover_config.store_dir)?);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping");
                shutdown.cancel();
            }
        });
    }

    if cli.once {
        let result = orchestrator.run_scan_until(shutdown).await;
        let path = store.save(&result)?;
        log_summary(&result, Some(&path.display().to_string()));

        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            for device in &result.devices {
                println!(
                    "{:<15}  {:<17}  {:<9}  {:<30}  {:?}",
                    device.ip,
                    device.mac_or_unknown(),
                    device.category.as_str(),
                    device.display_name(),
                    device.open_ports
                );
            }
            println!(
                "{} devices, status {}, {} ms",
                result.devices.len(),
                result.status,
                result.duration_ms.unwrap_or_default()
            );
        }
    } else {
        let sched = ScanScheduler::new(
            orchestrator,
            store,
            Duration::from_secs(discover_config.interval_secs),
        );
        sched.run(shutdown).await;
    }

    Ok(())
}
