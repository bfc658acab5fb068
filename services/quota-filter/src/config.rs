use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS};
use crate::quota::TierLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Listen host address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Storage proxy the filter sits in front of
    pub upstream_url: String,

    /// Upper bound on one metadata probe, in seconds
    pub probe_timeout_secs: u64,

    /// Upstream connect timeout in seconds. Forwarded writes have no overall
    /// deadline so large uploads can run to completion.
    pub connect_timeout_secs: u64,

    /// Inline quota tier document (JSON)
    pub quota_tiers: Option<String>,

    /// Path to a quota tier document, used when `quota_tiers` is unset
    pub quota_tiers_path: Option<PathBuf>,

    /// Lifetime of cached account/container metadata in seconds
    pub cache_timeout_secs: u64,

    /// Maximum number of cached account/container records
    pub cache_capacity: usize,

    /// Disable to always probe upstream
    pub cache_enabled: bool,

    /// Token sent with metadata probes
    pub probe_token: Option<String>,

    /// Log level
    pub log_level: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            upstream_url: "http://localhost:8000".to_string(),
            probe_timeout_secs: 10,
            connect_timeout_secs: 5,
            quota_tiers: None,
            quota_tiers_path: None,
            cache_timeout_secs: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_enabled: true,
            probe_token: None,
            log_level: "info".to_string(),
        }
    }
}

impl FilterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = std::env::var("QUOTA_FILTER_HOST") {
            cfg.host = host;
        }
        if let Ok(port) = std::env::var("QUOTA_FILTER_PORT") {
            cfg.port = port.parse().context("Invalid QUOTA_FILTER_PORT")?;
        }
        if let Ok(url) = std::env::var("UPSTREAM_URL") {
            cfg.upstream_url = url;
        }
        if let Ok(timeout) = std::env::var("PROBE_TIMEOUT_SECS") {
            cfg.probe_timeout_secs = timeout.parse().context("Invalid PROBE_TIMEOUT_SECS")?;
        }
        if let Ok(timeout) = std::env::var("CONNECT_TIMEOUT_SECS") {
            cfg.connect_timeout_secs = timeout.parse().context("Invalid CONNECT_TIMEOUT_SECS")?;
        }
        if let Ok(timeout) = std::env::var("CACHE_TIMEOUT_SECS") {
            cfg.cache_timeout_secs = timeout.parse().context("Invalid CACHE_TIMEOUT_SECS")?;
        }
        if let Ok(capacity) = std::env::var("CACHE_CAPACITY") {
            cfg.cache_capacity = capacity.parse().context("Invalid CACHE_CAPACITY")?;
        }
        if let Ok(flag) = std::env::var("CACHE_ENABLED") {
            cfg.cache_enabled = parse_bool(&flag)
                .with_context(|| format!("CACHE_ENABLED is invalid: {flag}"))?;
        }

        cfg.quota_tiers = std::env::var("QUOTA_TIERS").ok();
        cfg.quota_tiers_path = std::env::var("QUOTA_TIERS_PATH").ok().map(PathBuf::from);
        cfg.probe_token = std::env::var("QUOTA_PROBE_TOKEN").ok();

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        Ok(cfg)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream_url.is_empty() {
            anyhow::bail!("UPSTREAM_URL cannot be empty");
        }

        if self.probe_timeout_secs == 0 {
            anyhow::bail!("PROBE_TIMEOUT_SECS must be greater than 0");
        }

        if self.connect_timeout_secs == 0 {
            anyhow::bail!("CONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if self.cache_enabled && self.cache_capacity == 0 {
            anyhow::bail!("CACHE_CAPACITY must be greater than 0 when the cache is enabled");
        }

        if self.quota_tiers.is_none() && self.quota_tiers_path.is_none() {
            anyhow::bail!("one of QUOTA_TIERS or QUOTA_TIERS_PATH must be set");
        }

        Ok(())
    }

    /// Load and validate the quota tiers from whichever source is configured.
    pub fn load_tiers(&self) -> Result<TierLimits> {
        let limits = match (&self.quota_tiers, &self.quota_tiers_path) {
            (Some(raw), _) => TierLimits::load(raw).context("Invalid QUOTA_TIERS")?,
            (None, Some(path)) => TierLimits::load_file(path)
                .with_context(|| format!("Invalid quota tiers in {}", path.display()))?,
            (None, None) => anyhow::bail!("one of QUOTA_TIERS or QUOTA_TIERS_PATH must be set"),
        };
        Ok(limits)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => anyhow::bail!("invalid boolean value {value}"),
    }
}
