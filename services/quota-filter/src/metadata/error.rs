use std::time::Duration;

use thiserror::Error;

/// Reasons the usage counters could not be read. All of them fail open.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata probe for {path} returned status {status}")]
    Unavailable { path: String, status: u16 },

    #[error("metadata probe failed: {0}")]
    Probe(String),

    #[error("metadata probe for {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    #[error("invalid metadata probe request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("metadata header {header} has invalid value {value:?}")]
    InvalidHeader { header: &'static str, value: String },
}
