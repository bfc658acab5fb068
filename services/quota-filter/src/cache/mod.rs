mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::encode_segment;

pub use memory::{MemoryCache, NoCache};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Shared store for account and container metadata.
///
/// Implementations must make `get` and `set` individually atomic. A `set`
/// always replaces the whole entry.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// HTTP status of the lookup that produced the entry.
    pub status: u16,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CachedMetadata>,
}

impl CacheEntry {
    pub fn new(status: u16, metadata: CachedMetadata) -> Self {
        Self {
            status,
            created_at: Utc::now(),
            metadata: Some(metadata),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedMetadata {
    Account {
        container_count: u64,
        quota_level: String,
    },
    Container(ContainerInfo),
}

/// Container record as read from a container `HEAD`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub bytes_used: u64,
    pub object_count: u64,
    #[serde(default)]
    pub read_acl: String,
    #[serde(default)]
    pub write_acl: String,
    #[serde(default)]
    pub sync_key: String,
    #[serde(default)]
    pub versions: String,
}

/// Names are percent-encoded so a `/` inside a name cannot shift segments.
pub fn account_cache_key(account: &str) -> String {
    format!("account/{}", encode_segment(account))
}

pub fn container_cache_key(account: &str, container: &str) -> String {
    format!(
        "container/{}/{}",
        encode_segment(account),
        encode_segment(container)
    )
}
