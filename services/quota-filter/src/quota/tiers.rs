use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::error::TierConfigError;
use super::{QuotaDimension, DEFAULT_TIER};

#[derive(Debug, Deserialize)]
struct RawTierConfig {
    container_count: Option<HashMap<String, i64>>,
    object_count: Option<HashMap<String, i64>>,
    container_usage: Option<HashMap<String, i64>>,
}

/// Per-tier ceilings for every quota dimension.
///
/// Built once at startup through [`TierLimits::load`] and shared read-only by
/// every evaluation afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLimits {
    container_count: HashMap<String, u64>,
    object_count: HashMap<String, u64>,
    container_usage: HashMap<String, u64>,
}

impl TierLimits {
    /// Parse and validate a JSON tier document.
    pub fn load(raw: &str) -> Result<Self, TierConfigError> {
        let parsed: RawTierConfig = serde_json::from_str(raw)?;

        let limits = Self {
            container_count: validate_dimension(
                QuotaDimension::ContainerCount,
                parsed.container_count,
            )?,
            object_count: validate_dimension(QuotaDimension::ObjectCount, parsed.object_count)?,
            container_usage: validate_dimension(
                QuotaDimension::ContainerUsage,
                parsed.container_usage,
            )?,
        };

        info!(
            container_count_tiers = limits.container_count.len(),
            object_count_tiers = limits.object_count.len(),
            container_usage_tiers = limits.container_usage.len(),
            "loaded quota tiers"
        );

        Ok(limits)
    }

    pub fn load_file(path: &Path) -> Result<Self, TierConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| TierConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load(&raw)
    }

    /// Ceiling for `tier` in `dimension`, or `None` when the tier is not configured.
    pub fn limit(&self, dimension: QuotaDimension, tier: &str) -> Option<u64> {
        self.dimension(dimension).get(tier).copied()
    }

    pub fn dimension(&self, dimension: QuotaDimension) -> &HashMap<String, u64> {
        match dimension {
            QuotaDimension::ContainerCount => &self.container_count,
            QuotaDimension::ObjectCount => &self.object_count,
            QuotaDimension::ContainerUsage => &self.container_usage,
        }
    }
}

fn validate_dimension(
    dimension: QuotaDimension,
    tiers: Option<HashMap<String, i64>>,
) -> Result<HashMap<String, u64>, TierConfigError> {
    let tiers = tiers.ok_or(TierConfigError::MissingDimension(dimension))?;

    match tiers.get(DEFAULT_TIER) {
        None => return Err(TierConfigError::MissingDefault(dimension)),
        Some(&limit) if limit <= 0 => {
            return Err(TierConfigError::NonPositiveDefault { dimension, limit })
        }
        Some(_) => {}
    }

    tiers
        .into_iter()
        .map(|(tier, limit)| {
            u64::try_from(limit)
                .map(|limit| (tier.clone(), limit))
                .map_err(|_| TierConfigError::NegativeLimit {
                    dimension,
                    tier,
                    limit,
                })
        })
        .collect()
}
