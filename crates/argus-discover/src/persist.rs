//! Scan result storage: trait + JSON file implementation.
//!
//! Results are stored as JSON files organized by scan start date and id:
//! ```text
//! {root}/
//!   2026/
//!     10/
//!       19/
//!         {scan_id}.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use argus_core::{ScanId, ScanResult, ScanStatus};
use chrono::{DateTime, Utc};

/// Errors that can occur during scan storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Scan not found: {0}")]
    NotFound(ScanId),

    #[error("Scan {0} is still running")]
    StillRunning(ScanId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query parameters for listing stored scans.
#[derive(Debug, Default)]
pub struct ScanQuery {
    /// Filter by final status.
    pub status: Option<ScanStatus>,
    /// Only include scans started at or after this time.
    pub from: Option<DateTime<Utc>>,
    /// Only include scans started at or before this time.
    pub to: Option<DateTime<Utc>>,
}

/// Persistence backend for finished scans.
pub trait ScanStore: Send + Sync {
    /// Store a finished result. Results still running are rejected.
    fn save(&self, result: &ScanResult) -> Result<PathBuf, StoreError>;

    fn get(&self, id: ScanId) -> Result<ScanResult, StoreError>;

    /// List results matching the query, ordered by start time descending.
    fn list(&self, query: &ScanQuery) -> Result<Vec<ScanResult>, StoreError>;
}

/// File-system backed scan store.
pub struct JsonScanStore {
    root: PathBuf,
}

impl JsonScanStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn result_path(&self, result: &ScanResult) -> PathBuf {
        let date = result.started_at.format("%Y/%m/%d");
        self.root.join(format!("{}/{}.json", date, result.scan_id))
    }

    fn find_path(&self, id: ScanId) -> Result<PathBuf, StoreError> {
        let filename = format!("{id}.json");
        find_file_recursive(&self.root, &filename).ok_or(StoreError::NotFound(id))
    }
}

impl ScanStore for JsonScanStore {
    fn save(&self, result: &ScanResult) -> Result<PathBuf, StoreError> {
        if !result.status.is_final() {
            return Err(StoreError::StillRunning(result.scan_id));
        }

        let path = self.result_path(result);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json)?;

        tracing::debug!(
            scan_id = %result.scan_id,
            path = %path.display(),
            "Scan result saved"
        );

        Ok(path)
    }

    fn get(&self, id: ScanId) -> Result<ScanResult, StoreError> {
        let path = self.find_path(id)?;
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn list(&self, query: &ScanQuery) -> Result<Vec<ScanResult>, StoreError> {
        let mut results = Vec::new();
        collect_results_recursive(&self.root, query, &mut results)?;
        results.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(results)
    }
}

fn find_file_recursive(dir: &Path, filename: &str) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }

    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if let Some(found) = find_file_recursive(&path, filename) {
                return Some(found);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
            return Some(path);
        }
    }

    None
}

fn collect_results_recursive(
    dir: &Path,
    query: &ScanQuery,
    results: &mut Vec<ScanResult>,
) -> Result<(), StoreError> {
    if !dir.is_dir() {
        return Ok(());
    }

    let entries = fs::read_dir(dir)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_results_recursive(&path, query, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let json = fs::read_to_string(&path)?;
            let result: ScanResult = serde_json::from_str(&json)?;

            if matches_query(&result, query) {
                results.push(result);
            }
        }
    }

    Ok(())
}

fn matches_query(result: &ScanResult, query: &ScanQuery) -> bool {
    if let Some(status) = query.status {
        if result.status != status {
            return false;
        }
    }
    if let Some(from) = &query.from {
        if &result.started_at < from {
            return false;
        }
    }
    if let Some(to) = &query.to {
        if &result.started_at > to {
            return false;
        }
    }
    true
}
