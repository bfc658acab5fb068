use super::body::{boxed, ProxyBody};
use super::{Downstream, ProxyError};
use async_trait::async_trait;
use http::{HeaderMap, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Body as _;
use reqwest::{Body, Client};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Forwards requests to the storage proxy sitting behind the filter.
///
/// The filter is a transparent stage: `Host` and end-to-end headers travel
/// as the caller sent them and bodies are streamed in both directions.
pub struct UpstreamClient {
    http_client: Client,
    upstream_base_url: String,
}

impl UpstreamClient {
    pub fn new(upstream_url: String, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(20)
            .build()?;

        Ok(Self {
            http_client,
            upstream_base_url: upstream_url.trim_end_matches('/').to_string(),
        })
    }

    fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
        let mut sanitized = HeaderMap::new();

        // List of hop-by-hop headers to remove
        const HOP_BY_HOP: &[&str] = &[
            "connection",
            "keep-alive",
            "proxy-authenticate",
            "proxy-authorization",
            "proxy-connection",
            "te",
            "trailer",
            "transfer-encoding",
            "upgrade",
        ];

        for (name, value) in headers.iter() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            sanitized.append(name.clone(), value.clone());
        }

        sanitized
    }
}

#[async_trait]
impl Downstream for UpstreamClient {
    #[instrument(skip(self, req), fields(method = %req.method(), path = %req.uri().path()))]
    async fn call(&self, req: Request<ProxyBody>) -> Result<Response<ProxyBody>, ProxyError> {
        let (parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let upstream_url = format!("{}{}", self.upstream_base_url, path_and_query);

        debug!(upstream_url = %upstream_url, "Forwarding request to upstream");

        let mut upstream_req = self
            .http_client
            .request(parts.method.clone(), &upstream_url)
            .headers(Self::sanitize_headers(&parts.headers));

        if !body.is_end_stream() {
            upstream_req = upstream_req.body(Body::wrap_stream(body.into_data_stream()));
        }

        let start = std::time::Instant::now();

        let upstream_response = upstream_req
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = upstream_response.status();
        info!(
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis(),
            "Upstream response received"
        );

        let mut response_builder = Response::builder().status(status);
        for (name, value) in Self::sanitize_headers(upstream_response.headers()).iter() {
            response_builder = response_builder.header(name, value);
        }

        response_builder
            .body(boxed(Body::from(upstream_response)))
            .map_err(|e| ProxyError::InvalidResponse(e.to_string()))
    }
}
