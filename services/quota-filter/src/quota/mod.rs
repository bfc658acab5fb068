mod error;
mod evaluator;
mod tiers;

use std::fmt;

pub use error::TierConfigError;
pub use evaluator::{
    evaluate_container_create, evaluate_object_write, QuotaDecision, QuotaViolation,
    CONTAINER_COUNT_OVER_QUOTA, CONTAINER_USAGE_OVER_QUOTA, OBJECT_COUNT_OVER_QUOTA,
};
pub use tiers::TierLimits;

pub const DEFAULT_TIER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaDimension {
    ContainerCount,
    ObjectCount,
    ContainerUsage,
}

impl QuotaDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaDimension::ContainerCount => "container_count",
            QuotaDimension::ObjectCount => "object_count",
            QuotaDimension::ContainerUsage => "container_usage",
        }
    }
}

impl fmt::Display for QuotaDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account counters reported by the metadata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUsage {
    pub container_count: u64,
    pub tier: String,
}

/// Container counters reported by the metadata service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerUsage {
    pub bytes_used: u64,
    pub object_count: u64,
}
