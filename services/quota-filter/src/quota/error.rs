use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::QuotaDimension;

#[derive(Debug, Error)]
pub enum TierConfigError {
    #[error("quota configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unable to read quota configuration {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("quota configuration is missing the {0} dimension")]
    MissingDimension(QuotaDimension),

    #[error("quota dimension {0} needs a default tier")]
    MissingDefault(QuotaDimension),

    #[error("default tier of {dimension} must be greater than zero, got {limit}")]
    NonPositiveDefault { dimension: QuotaDimension, limit: i64 },

    #[error("tier {tier} of {dimension} has a negative limit: {limit}")]
    NegativeLimit {
        dimension: QuotaDimension,
        tier: String,
        limit: i64,
    },
}
