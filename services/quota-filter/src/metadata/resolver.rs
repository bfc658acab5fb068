use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tracing::{debug, instrument, warn};

use crate::cache::{
    account_cache_key, container_cache_key, CacheEntry, CachedMetadata, ContainerInfo,
    MetadataCache,
};
use crate::proxy::{full, Downstream};
use crate::quota::{AccountUsage, ContainerUsage, DEFAULT_TIER};

use super::probe::{ForwardedAttributes, ProbeRequestBuilder};
use super::{
    MetadataError, ACCOUNT_CONTAINER_COUNT_HEADER, ACCOUNT_QUOTA_HEADER,
    CONTAINER_BYTES_USED_HEADER, CONTAINER_OBJECT_COUNT_HEADER, CONTAINER_READ_HEADER,
    CONTAINER_SYNC_KEY_HEADER, CONTAINER_WRITE_HEADER, VERSIONS_LOCATION_HEADER,
};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    Cache,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub usage: T,
    pub source: MetadataSource,
}

/// Reads account and container counters, cache first and upstream on a miss.
pub struct MetadataResolver {
    cache: Arc<dyn MetadataCache>,
    upstream: Arc<dyn Downstream>,
    cache_ttl: Duration,
    probe_timeout: Duration,
    probe_token: Option<String>,
}

impl MetadataResolver {
    pub fn new(
        cache: Arc<dyn MetadataCache>,
        upstream: Arc<dyn Downstream>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            upstream,
            cache_ttl,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_token: None,
        }
    }

    /// Upper bound on a single metadata probe. An expired probe fails open.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_probe_token(mut self, token: Option<String>) -> Self {
        self.probe_token = token;
        self
    }

    #[instrument(skip(self, attributes))]
    pub async fn resolve_account(
        &self,
        attributes: &ForwardedAttributes,
        version: &str,
        account: &str,
    ) -> Result<Resolved<AccountUsage>, MetadataError> {
        let key = account_cache_key(account);

        if let Some(CachedMetadata::Account {
            container_count,
            quota_level,
        }) = self.cached(&key).await
        {
            return Ok(Resolved {
                usage: AccountUsage {
                    container_count,
                    tier: quota_level,
                },
                source: MetadataSource::Cache,
            });
        }

        let probe = ProbeRequestBuilder::account(version, account);
        let (status, headers) = self.probe(probe, attributes).await?;

        let container_count = header_u64(&headers, ACCOUNT_CONTAINER_COUNT_HEADER)?;
        let tier = header_str(&headers, ACCOUNT_QUOTA_HEADER)
            .filter(|tier| !tier.is_empty())
            .unwrap_or(DEFAULT_TIER)
            .to_string();

        self.store(
            &key,
            CacheEntry::new(
                status,
                CachedMetadata::Account {
                    container_count,
                    quota_level: tier.clone(),
                },
            ),
        )
        .await;

        Ok(Resolved {
            usage: AccountUsage {
                container_count,
                tier,
            },
            source: MetadataSource::Upstream,
        })
    }

    #[instrument(skip(self, attributes))]
    pub async fn resolve_container(
        &self,
        attributes: &ForwardedAttributes,
        version: &str,
        account: &str,
        container: &str,
    ) -> Result<Resolved<ContainerUsage>, MetadataError> {
        let key = container_cache_key(account, container);

        if let Some(CachedMetadata::Container(info)) = self.cached(&key).await {
            return Ok(Resolved {
                usage: ContainerUsage {
                    bytes_used: info.bytes_used,
                    object_count: info.object_count,
                },
                source: MetadataSource::Cache,
            });
        }

        let probe = ProbeRequestBuilder::container(version, account, container);
        let (status, headers) = self.probe(probe, attributes).await?;

        let info = ContainerInfo {
            bytes_used: header_u64(&headers, CONTAINER_BYTES_USED_HEADER)?,
            object_count: header_u64(&headers, CONTAINER_OBJECT_COUNT_HEADER)?,
            read_acl: header_string(&headers, CONTAINER_READ_HEADER),
            write_acl: header_string(&headers, CONTAINER_WRITE_HEADER),
            sync_key: header_string(&headers, CONTAINER_SYNC_KEY_HEADER),
            versions: header_string(&headers, VERSIONS_LOCATION_HEADER),
        };
        let usage = ContainerUsage {
            bytes_used: info.bytes_used,
            object_count: info.object_count,
        };

        self.store(&key, CacheEntry::new(status, CachedMetadata::Container(info)))
            .await;

        Ok(Resolved {
            usage,
            source: MetadataSource::Upstream,
        })
    }

    /// Successful cached metadata for `key`. Backend errors and failure
    /// entries read as a miss.
    async fn cached(&self, key: &str) -> Option<CachedMetadata> {
        match self.cache.get(key).await {
            Ok(Some(entry)) if entry.is_success() => {
                debug!(key, status = entry.status, "metadata cache hit");
                entry.metadata
            }
            Ok(Some(entry)) => {
                debug!(key, status = entry.status, "cached failure, probing upstream");
                None
            }
            Ok(None) => {
                debug!(key, "metadata cache miss");
                None
            }
            Err(err) => {
                warn!(key, error = %err, "metadata cache unavailable, treating as miss");
                None
            }
        }
    }

    async fn store(&self, key: &str, entry: CacheEntry) {
        if let Err(err) = self.cache.set(key, entry, self.cache_ttl).await {
            warn!(key, error = %err, "failed to write metadata cache");
        }
    }

    async fn probe(
        &self,
        probe: ProbeRequestBuilder<'_>,
        attributes: &ForwardedAttributes,
    ) -> Result<(u16, HeaderMap), MetadataError> {
        let path = probe.path().to_string();
        let request = probe
            .forwarded(attributes)
            .auth_token(self.probe_token.as_deref())
            .build()?;

        let call = self.upstream.call(request.map(full));
        let response = tokio::time::timeout(self.probe_timeout, call)
            .await
            .map_err(|_| MetadataError::Timeout {
                path: path.clone(),
                timeout: self.probe_timeout,
            })?
            .map_err(|e| MetadataError::Probe(e.to_string()))?;

        let status = response.status();
        debug!(path = %path, status = status.as_u16(), "metadata probe completed");

        if !status.is_success() {
            return Err(MetadataError::Unavailable {
                path,
                status: status.as_u16(),
            });
        }

        Ok((status.as_u16(), response.into_parts().0.headers))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    header_str(headers, name).unwrap_or_default().to_string()
}

fn header_u64(headers: &HeaderMap, name: &'static str) -> Result<u64, MetadataError> {
    let Some(value) = headers.get(name) else {
        return Ok(0);
    };

    let invalid = || MetadataError::InvalidHeader {
        header: name,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };

    let text = value.to_str().map_err(|_| invalid())?.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::proxy::{empty, ProxyBody, ProxyError};
    use async_trait::async_trait;
    use chrono::Utc;
    use http::request::Parts;
    use http::{Method, Request, Response, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeUpstream {
        status: StatusCode,
        headers: Vec<(&'static str, &'static str)>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Parts>>,
    }

    impl FakeUpstream {
        fn new(status: StatusCode, headers: Vec<(&'static str, &'static str)>) -> Arc<Self> {
            Arc::new(Self::build(status, headers))
        }

        fn build(status: StatusCode, headers: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                status,
                headers,
                delay: None,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Downstream for FakeUpstream {
        async fn call(
            &self,
            req: Request<ProxyBody>,
        ) -> Result<Response<ProxyBody>, ProxyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(req.into_parts().0);
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            let mut builder = Response::builder().status(self.status);
            for (name, value) in &self.headers {
                builder = builder.header(*name, *value);
            }
            Ok(builder.body(empty()).unwrap())
        }
    }

    struct FailingUpstream;

    #[async_trait]
    impl Downstream for FailingUpstream {
        async fn call(
            &self,
            _req: Request<ProxyBody>,
        ) -> Result<Response<ProxyBody>, ProxyError> {
            Err(ProxyError::Upstream("connection refused".to_string()))
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl MetadataCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Unavailable("memcached down".to_string()))
        }

        async fn set(
            &self,
            _key: &str,
            _entry: CacheEntry,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("memcached down".to_string()))
        }
    }

    fn resolver(cache: Arc<dyn MetadataCache>, upstream: Arc<dyn Downstream>) -> MetadataResolver {
        MetadataResolver::new(cache, upstream, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_account_cache_hit_never_probes() {
        let cache = Arc::new(MemoryCache::default());
        cache
            .set(
                "account/AUTH_test",
                CacheEntry::new(
                    204,
                    CachedMetadata::Account {
                        container_count: 4,
                        quota_level: "L1".to_string(),
                    },
                ),
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        let upstream = FakeUpstream::new(StatusCode::NO_CONTENT, vec![]);
        let resolver = resolver(cache, upstream.clone());
        let attrs = ForwardedAttributes::default();

        for _ in 0..3 {
            let resolved = resolver
                .resolve_account(&attrs, "v1", "AUTH_test")
                .await
                .unwrap();
            assert_eq!(resolved.source, MetadataSource::Cache);
            assert_eq!(resolved.usage.container_count, 4);
            assert_eq!(resolved.usage.tier, "L1");
        }
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_account_miss_probes_then_caches() {
        let cache = Arc::new(MemoryCache::default());
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![
                ("X-Account-Container-Count", "3"),
                ("X-Account-Meta-Quota", "L2"),
            ],
        );
        let resolver = resolver(cache.clone(), upstream.clone());
        let attrs = ForwardedAttributes::default();

        let first = resolver
            .resolve_account(&attrs, "v1", "AUTH_test")
            .await
            .unwrap();
        assert_eq!(first.source, MetadataSource::Upstream);
        assert_eq!(
            first.usage,
            AccountUsage {
                container_count: 3,
                tier: "L2".to_string()
            }
        );

        let second = resolver
            .resolve_account(&attrs, "v1", "AUTH_test")
            .await
            .unwrap();
        assert_eq!(second.source, MetadataSource::Cache);
        assert_eq!(second.usage, first.usage);
        assert_eq!(upstream.calls(), 1);

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::HEAD);
        assert_eq!(seen[0].uri.path(), "/v1/AUTH_test");

        let entry = cache.get("account/AUTH_test").await.unwrap().unwrap();
        assert_eq!(entry.status, 204);
    }

    #[tokio::test]
    async fn test_concurrent_misses_both_fetch() {
        let cache = Arc::new(MemoryCache::default());
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![("X-Account-Container-Count", "2")],
        );
        let resolver = resolver(cache.clone(), upstream.clone());
        let attrs = ForwardedAttributes::default();

        let (first, second) = tokio::join!(
            resolver.resolve_account(&attrs, "v1", "AUTH_test"),
            resolver.resolve_account(&attrs, "v1", "AUTH_test"),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        // Both lookups missed before either wrote back; the writes are
        // identical replacements.
        assert_eq!(upstream.calls(), 2);
        assert_eq!(first.source, MetadataSource::Upstream);
        assert_eq!(second.source, MetadataSource::Upstream);
        assert_eq!(first.usage, second.usage);
        assert_eq!(cache.len(), 1);

        let third = resolver
            .resolve_account(&attrs, "v1", "AUTH_test")
            .await
            .unwrap();
        assert_eq!(third.source, MetadataSource::Cache);
        assert_eq!(third.usage.container_count, 2);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_account_tier_defaults() {
        let upstream = FakeUpstream::new(StatusCode::OK, vec![("X-Account-Container-Count", "1")]);
        let resolver = resolver(Arc::new(MemoryCache::default()), upstream);

        let resolved = resolver
            .resolve_account(&ForwardedAttributes::default(), "v1", "AUTH_test")
            .await
            .unwrap();
        assert_eq!(resolved.usage.tier, "default");
    }

    #[tokio::test]
    async fn test_cached_failure_reprobes() {
        let cache = Arc::new(MemoryCache::default());
        cache
            .set(
                "account/AUTH_test",
                CacheEntry {
                    status: 404,
                    created_at: Utc::now(),
                    metadata: None,
                },
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![("X-Account-Container-Count", "2")],
        );
        let resolver = resolver(cache, upstream.clone());

        let resolved = resolver
            .resolve_account(&ForwardedAttributes::default(), "v1", "AUTH_test")
            .await
            .unwrap();
        assert_eq!(resolved.source, MetadataSource::Upstream);
        assert_eq!(resolved.usage.container_count, 2);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_success_probe_is_unavailable() {
        let cache = Arc::new(MemoryCache::default());
        let upstream = FakeUpstream::new(StatusCode::SERVICE_UNAVAILABLE, vec![]);
        let resolver = resolver(cache.clone(), upstream);

        let err = resolver
            .resolve_container(&ForwardedAttributes::default(), "v1", "AUTH_test", "photos")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::Unavailable { status: 503, .. }
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let resolver = resolver(Arc::new(MemoryCache::default()), Arc::new(FailingUpstream));
        let err = resolver
            .resolve_account(&ForwardedAttributes::default(), "v1", "AUTH_test")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Probe(_)));
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let mut slow = FakeUpstream::build(StatusCode::NO_CONTENT, vec![]);
        slow.delay = Some(Duration::from_secs(5));
        let cache = Arc::new(MemoryCache::default());
        let resolver = resolver(cache.clone(), Arc::new(slow))
            .with_probe_timeout(Duration::from_millis(20));

        let err = resolver
            .resolve_account(&ForwardedAttributes::default(), "v1", "AUTH_test")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Timeout { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_container_miss_caches_full_record() {
        let cache = Arc::new(MemoryCache::default());
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![
                ("X-Container-Bytes-Used", "2048"),
                ("X-Container-Object-Count", "7"),
                ("X-Container-Read", ".r:*"),
                ("X-Versions-Location", "photos_versions"),
            ],
        );
        let resolver = resolver(cache.clone(), upstream.clone());
        let attrs = ForwardedAttributes::default();

        let resolved = resolver
            .resolve_container(&attrs, "v1", "AUTH_test", "photos")
            .await
            .unwrap();
        assert_eq!(resolved.source, MetadataSource::Upstream);
        assert_eq!(
            resolved.usage,
            ContainerUsage {
                bytes_used: 2048,
                object_count: 7
            }
        );

        let entry = cache.get("container/AUTH_test/photos").await.unwrap().unwrap();
        match entry.metadata {
            Some(CachedMetadata::Container(info)) => {
                assert_eq!(info.read_acl, ".r:*");
                assert_eq!(info.write_acl, "");
                assert_eq!(info.versions, "photos_versions");
            }
            other => panic!("unexpected cache entry {other:?}"),
        }

        let again = resolver
            .resolve_container(&attrs, "v1", "AUTH_test", "photos")
            .await
            .unwrap();
        assert_eq!(again.source, MetadataSource::Cache);
        assert_eq!(upstream.calls(), 1);
        assert_eq!(
            upstream.seen.lock().unwrap()[0].uri.path(),
            "/v1/AUTH_test/photos"
        );
    }

    #[tokio::test]
    async fn test_missing_counters_read_as_zero() {
        let upstream = FakeUpstream::new(StatusCode::NO_CONTENT, vec![]);
        let resolver = resolver(Arc::new(MemoryCache::default()), upstream);

        let resolved = resolver
            .resolve_container(&ForwardedAttributes::default(), "v1", "AUTH_test", "c")
            .await
            .unwrap();
        assert_eq!(resolved.usage.bytes_used, 0);
        assert_eq!(resolved.usage.object_count, 0);
    }

    #[tokio::test]
    async fn test_garbled_counter_is_unavailable() {
        let cache = Arc::new(MemoryCache::default());
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![("X-Container-Bytes-Used", "lots")],
        );
        let resolver = resolver(cache.clone(), upstream);

        let err = resolver
            .resolve_container(&ForwardedAttributes::default(), "v1", "AUTH_test", "c")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetadataError::InvalidHeader {
                header: "x-container-bytes-used",
                ..
            }
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_probe() {
        let upstream = FakeUpstream::new(
            StatusCode::NO_CONTENT,
            vec![("X-Account-Container-Count", "1")],
        );
        let resolver = resolver(Arc::new(BrokenCache), upstream.clone());
        let attrs = ForwardedAttributes::default();

        for _ in 0..2 {
            let resolved = resolver
                .resolve_account(&attrs, "v1", "AUTH_test")
                .await
                .unwrap();
            assert_eq!(resolved.source, MetadataSource::Upstream);
        }
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn test_probe_token_is_sent() {
        let upstream = FakeUpstream::new(StatusCode::NO_CONTENT, vec![]);
        let resolver = resolver(Arc::new(MemoryCache::default()), upstream.clone())
            .with_probe_token(Some("reseller".to_string()));

        resolver
            .resolve_account(&ForwardedAttributes::default(), "v1", "AUTH_test")
            .await
            .unwrap();

        let seen = upstream.seen.lock().unwrap();
        assert_eq!(seen[0].headers.get("x-auth-token").unwrap(), "reseller");
    }
}
