//! Error types for the argus-discover crate.
//!
//! Probe failures never appear here: they resolve to absent values at the
//! probe boundary. These errors cover configuration, storage and the task
//! plumbing around a scan.

use thiserror::Error;

use crate::persist::StoreError;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid scan target: {0}")]
    InvalidTarget(#[from] argus_core::ArgusError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scan store error: {0}")]
    Store(#[from] StoreError),

    #[error("Scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DiscoverError {
    fn from(e: config::ConfigError) -> Self {
        DiscoverError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
