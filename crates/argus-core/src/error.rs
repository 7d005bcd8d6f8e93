use thiserror::Error;

/// Top-level error type for Argus domain types.
#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("Invalid network range '{cidr}': {reason}")]
    InvalidRange { cidr: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
