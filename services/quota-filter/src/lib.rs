//! Quota admission filter for an object-storage write path.
//!
//! Container and object PUTs are checked against per-tier limits before they
//! reach the storage proxy. Usage counters come from a TTL cache, falling back
//! to a `HEAD` probe against the same proxy, and any failure to read them lets
//! the write through.

pub mod cache;
pub mod config;
pub mod filter;
pub mod metadata;
pub mod path;
pub mod proxy;
pub mod quota;
pub mod server;
