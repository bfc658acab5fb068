use crate::cache::{MemoryCache, MetadataCache, NoCache};
use crate::config::FilterConfig;
use crate::filter::QuotaFilter;
use crate::metadata::MetadataResolver;
use crate::proxy::{boxed, Downstream, ProxyBody, UpstreamClient};
use anyhow::{Context, Result};
use http::{HeaderValue, Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

const TRANS_ID_HEADER: &str = "x-trans-id";

pub struct ProxyServer {
    config: Arc<FilterConfig>,
    filter: Arc<QuotaFilter>,
}

impl ProxyServer {
    /// Build the filter pipeline. Fails when the quota tiers do not load.
    pub fn new(config: FilterConfig) -> Result<Self> {
        let limits = Arc::new(config.load_tiers()?);

        let upstream: Arc<dyn Downstream> = Arc::new(
            UpstreamClient::new(config.upstream_url.clone(), config.connect_timeout())
                .context("Failed to build upstream client")?,
        );

        let cache: Arc<dyn MetadataCache> = if config.cache_enabled {
            Arc::new(MemoryCache::new(config.cache_capacity))
        } else {
            warn!("metadata cache disabled, every quota check probes upstream");
            Arc::new(NoCache)
        };

        let resolver = MetadataResolver::new(cache, Arc::clone(&upstream), config.cache_ttl())
            .with_probe_timeout(config.probe_timeout())
            .with_probe_token(config.probe_token.clone());
        let filter = Arc::new(QuotaFilter::new(limits, resolver, upstream));

        Ok(Self {
            config: Arc::new(config),
            filter,
        })
    }

    /// Run the proxy server
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr()
            .parse()
            .context("Invalid listen address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;

        info!(
            "Quota filter listening on {} (upstream: {})",
            addr, self.config.upstream_url
        );

        let server = Arc::new(self);

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let server = Arc::clone(&server);

            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                    error!("Connection error from {}: {}", peer_addr, e);
                }
            });
        }
    }

    /// Handle a single connection
    async fn handle_connection(
        self: Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let server = Arc::clone(&self);
            async move { Ok::<_, Infallible>(server.handle_request(req, peer_addr).await) }
        });

        http1::Builder::new()
            .serve_connection(io, service)
            .await
            .context("Failed to serve connection")?;

        Ok(())
    }

    #[instrument(skip(self, req), fields(trans_id))]
    async fn handle_request(
        &self,
        req: Request<Incoming>,
        peer_addr: SocketAddr,
    ) -> Response<ProxyBody> {
        let start = std::time::Instant::now();
        let (mut parts, body) = req.into_parts();

        let trans_id = match parts
            .headers
            .get(TRANS_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(id) => id.to_string(),
            None => {
                let id = format!("tx{}", uuid::Uuid::new_v4().simple());
                if let Ok(value) = HeaderValue::from_str(&id) {
                    parts.headers.insert(TRANS_ID_HEADER, value);
                }
                id
            }
        };
        tracing::Span::current().record("trans_id", trans_id.as_str());

        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        // The quota decision only needs the request head; the body streams
        // to upstream once the write is admitted.
        let request = Request::from_parts(parts, boxed(body));
        let response = match self.filter.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "request failed");
                err.to_response(Some(&trans_id))
            }
        };

        info!(
            peer = %peer_addr,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            head_latency_ms = start.elapsed().as_millis(),
            "Response head sent"
        );

        response
    }
}
