mod error;
mod probe;
mod resolver;

pub use error::MetadataError;
pub use probe::{ForwardedAttributes, ProbeRequestBuilder};
pub use resolver::{MetadataResolver, MetadataSource, Resolved};

pub const ACCOUNT_CONTAINER_COUNT_HEADER: &str = "x-account-container-count";
pub const ACCOUNT_QUOTA_HEADER: &str = "x-account-meta-quota";
pub const CONTAINER_BYTES_USED_HEADER: &str = "x-container-bytes-used";
pub const CONTAINER_OBJECT_COUNT_HEADER: &str = "x-container-object-count";
pub const CONTAINER_READ_HEADER: &str = "x-container-read";
pub const CONTAINER_WRITE_HEADER: &str = "x-container-write";
pub const CONTAINER_SYNC_KEY_HEADER: &str = "x-container-sync-key";
pub const VERSIONS_LOCATION_HEADER: &str = "x-versions-location";
