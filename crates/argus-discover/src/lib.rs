//! argus-discover: active device discovery for local IPv4 networks.
//!
//! Resolves the ranges to scan, pings every address, and for each live host
//! resolves MAC and hostname, checks a fixed set of TCP ports and assigns a
//! coarse device category. Finished scans are stored as JSON.

pub mod arp;
pub mod classify;
pub mod config;
pub mod error;
pub mod hostname;
pub mod orchestrator;
pub mod persist;
pub mod platform;
pub mod ports;
pub mod probe;
pub mod range;
pub mod resolve;
pub mod scheduler;

pub use orchestrator::{Orchestrator, Probes, ScanHandle, ScanOptions};
