use std::fmt;

use tracing::warn;

use super::{AccountUsage, ContainerUsage, QuotaDimension, TierLimits};

pub const CONTAINER_COUNT_OVER_QUOTA: &str = "The number of container is over quota";
pub const CONTAINER_USAGE_OVER_QUOTA: &str = "The usage of container is over quota";
pub const OBJECT_COUNT_OVER_QUOTA: &str = "The count of object is over quota";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaViolation {
    ContainerCount { current: u64, limit: u64 },
    ContainerUsage { current: u64, limit: u64 },
    ObjectCount { current: u64, limit: u64 },
}

impl QuotaViolation {
    pub fn dimension(&self) -> QuotaDimension {
        match self {
            QuotaViolation::ContainerCount { .. } => QuotaDimension::ContainerCount,
            QuotaViolation::ContainerUsage { .. } => QuotaDimension::ContainerUsage,
            QuotaViolation::ObjectCount { .. } => QuotaDimension::ObjectCount,
        }
    }

    /// Plain-text body returned to the client on rejection.
    pub fn message(&self) -> &'static str {
        match self {
            QuotaViolation::ContainerCount { .. } => CONTAINER_COUNT_OVER_QUOTA,
            QuotaViolation::ContainerUsage { .. } => CONTAINER_USAGE_OVER_QUOTA,
            QuotaViolation::ObjectCount { .. } => OBJECT_COUNT_OVER_QUOTA,
        }
    }

    /// Counter value after the write would have been applied.
    pub fn current(&self) -> u64 {
        match *self {
            QuotaViolation::ContainerCount { current, .. }
            | QuotaViolation::ContainerUsage { current, .. }
            | QuotaViolation::ObjectCount { current, .. } => current,
        }
    }

    pub fn limit(&self) -> u64 {
        match *self {
            QuotaViolation::ContainerCount { limit, .. }
            | QuotaViolation::ContainerUsage { limit, .. }
            | QuotaViolation::ObjectCount { limit, .. } => limit,
        }
    }
}

impl fmt::Display for QuotaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: Option<QuotaViolation>,
}

impl QuotaDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(violation: QuotaViolation) -> Self {
        Self {
            allowed: false,
            reason: Some(violation),
        }
    }
}

/// Decide whether the account may create one more container.
pub fn evaluate_container_create(usage: &AccountUsage, limits: &TierLimits) -> QuotaDecision {
    let Some(limit) = tier_limit(limits, QuotaDimension::ContainerCount, &usage.tier) else {
        return QuotaDecision::allow();
    };

    let projected = usage.container_count.saturating_add(1);
    if projected > limit {
        return QuotaDecision::deny(QuotaViolation::ContainerCount {
            current: projected,
            limit,
        });
    }

    QuotaDecision::allow()
}

/// Decide whether an object of `object_size` bytes may be written into the container.
///
/// Byte usage is checked before the object count, so a write that breaks both
/// ceilings reports the usage violation.
pub fn evaluate_object_write(
    account: &AccountUsage,
    container: &ContainerUsage,
    object_size: u64,
    limits: &TierLimits,
) -> QuotaDecision {
    if let Some(limit) = tier_limit(limits, QuotaDimension::ContainerUsage, &account.tier) {
        let projected = container.bytes_used.saturating_add(object_size);
        if projected > limit {
            return QuotaDecision::deny(QuotaViolation::ContainerUsage {
                current: projected,
                limit,
            });
        }
    }

    if let Some(limit) = tier_limit(limits, QuotaDimension::ObjectCount, &account.tier) {
        let projected = container.object_count.saturating_add(1);
        if projected > limit {
            return QuotaDecision::deny(QuotaViolation::ObjectCount {
                current: projected,
                limit,
            });
        }
    }

    QuotaDecision::allow()
}

fn tier_limit(limits: &TierLimits, dimension: QuotaDimension, tier: &str) -> Option<u64> {
    let limit = limits.limit(dimension, tier);
    if limit.is_none() {
        warn!(
            tier,
            dimension = %dimension,
            "unknown quota tier, dimension not enforced"
        );
    }
    limit
}
