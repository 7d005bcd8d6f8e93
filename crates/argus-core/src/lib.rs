//! argus-core: Shared types, scan events, and error handling for Argus.
//!
//! This crate provides the foundational types used across all Argus components:
//! - Network ranges and discovered devices
//! - The aggregate result of a discovery run
//! - Lifecycle events emitted while a scan is in progress
//! - Common error types

pub mod error;
pub mod events;
pub mod types;

pub use error::ArgusError;
pub use events::ScanEvent;
pub use types::{
    Device, DeviceCategory, HostStatus, NetworkRange, ScanId, ScanResult, ScanStatus,
};
