//! Scan scheduling engine.
//!
//! Runs one discovery scan per interval tick and hands every finished result
//! to the scan store. A shutdown token cancels the scan in flight and ends the
//! loop; the partial result is still saved.

use std::sync::Arc;

use argus_core::ScanResult;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;
use crate::persist::ScanStore;

/// Periodic scan runner.
pub struct ScanScheduler {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn ScanStore>,
    interval: Duration,
}

impl ScanScheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, store: Arc<dyn ScanStore>, interval: Duration) -> Self {
        Self {
            orchestrator,
            store,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Scan on every tick until `shutdown` fires. The first tick is immediate.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tracing::info!("Scheduled scan triggered");
            run_single_scan(&self.orchestrator, self.store.as_ref(), shutdown.child_token()).await;

            if shutdown.is_cancelled() {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

/// Execute a single scan and store its result. A failed save is logged; the
/// result is returned either way.
pub async fn run_single_scan(
    orchestrator: &Orchestrator,
    store: &dyn ScanStore,
    cancel: CancellationToken,
) -> ScanResult {
    let result = orchestrator.run_scan_until(cancel).await;

    match store.save(&result) {
        Ok(path) => log_summary(&result, Some(&path.display().to_string())),
        Err(e) => {
            tracing::error!(scan_id = %result.scan_id, error = %e, "Failed to save scan result");
            log_summary(&result, None);
        }
    }

    result
}

/// One summary line per finished scan.
pub fn log_summary(result: &ScanResult, saved_to: Option<&str>) {
    let categories: Vec<String> = result
        .count_by_category()
        .into_iter()
        .map(|(category, count)| format!("{category}={count}"))
        .collect();

    tracing::info!(
        scan_id = %result.scan_id,
        status = %result.status,
        devices = result.devices.len(),
        hosts_probed = result.hosts_probed,
        categories = %categories.join(","),
        duration_ms = result.duration_ms.unwrap_or_default(),
        saved_to = saved_to.unwrap_or("-"),
        "Scan complete"
    );
}
