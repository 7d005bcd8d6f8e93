//! Scan lifecycle events.
//!
//! Emitted by the orchestrator while a scan runs so that an external consumer
//! (a dashboard, a websocket bridge) can show progress without waiting for
//! the final `ScanResult`.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceCategory, ScanId, ScanStatus};

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum ScanEvent {
    /// A scan resolved its ranges and started probing.
    ScanStarted {
        scan_id: ScanId,
        ranges: Vec<String>,
        hosts_planned: u64,
    },
    /// A live host was probed and classified.
    HostDiscovered {
        scan_id: ScanId,
        ip: String,
        category: DeviceCategory,
    },
    /// The scan was finalized.
    ScanFinished {
        scan_id: ScanId,
        status: ScanStatus,
        devices_found: u32,
        duration_ms: u64,
    },
}

impl ScanEvent {
    pub fn scan_id(&self) -> ScanId {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::HostDiscovered { scan_id, .. }
            | ScanEvent::ScanFinished { scan_id, .. } => *scan_id,
        }
    }
}
