use std::sync::Arc;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use tracing::{debug, info, instrument, warn};

use crate::metadata::{ForwardedAttributes, MetadataResolver};
use crate::proxy::{full, Downstream, ProxyBody, ProxyError};
use crate::quota::{
    evaluate_container_create, evaluate_object_write, QuotaDecision, QuotaViolation, TierLimits,
};

use super::Route;

/// Admission filter in front of the storage write path.
///
/// Container and object PUTs are checked against the account's tier before
/// they reach `downstream`; everything else goes straight through. Any
/// failure to read usage lets the request through.
pub struct QuotaFilter {
    limits: Arc<TierLimits>,
    resolver: MetadataResolver,
    downstream: Arc<dyn Downstream>,
}

impl QuotaFilter {
    pub fn new(
        limits: Arc<TierLimits>,
        resolver: MetadataResolver,
        downstream: Arc<dyn Downstream>,
    ) -> Self {
        Self {
            limits,
            resolver,
            downstream,
        }
    }

    #[instrument(skip(self, req), fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn handle(
        &self,
        req: Request<ProxyBody>,
    ) -> Result<Response<ProxyBody>, ProxyError> {
        let route = Route::classify(req.method(), req.uri().path(), req.headers());

        let decision = self.evaluate(&route, req.headers()).await;
        if let Some(violation) = decision.reason.filter(|_| !decision.allowed) {
            return Ok(reject(&violation));
        }

        self.downstream.call(req).await
    }

    /// Run the quota checks for `route`. Requests that need no check, and
    /// requests whose usage cannot be read, are allowed.
    pub async fn evaluate(&self, route: &Route, headers: &HeaderMap) -> QuotaDecision {
        match route {
            Route::Passthrough => QuotaDecision::allow(),
            Route::ContainerCreate {
                version,
                account,
                container,
            } => {
                let attributes = ForwardedAttributes::from_headers(headers);
                let usage = match self
                    .resolver
                    .resolve_account(&attributes, version, account)
                    .await
                {
                    Ok(resolved) => resolved.usage,
                    Err(err) => {
                        warn!(account = %account, error = %err, "account metadata unavailable, skipping quota check");
                        return QuotaDecision::allow();
                    }
                };

                let decision = evaluate_container_create(&usage, &self.limits);
                if let Some(violation) = &decision.reason {
                    info!(
                        account = %account,
                        container = %container,
                        tier = %usage.tier,
                        container_count = violation.current(),
                        quota = violation.limit(),
                        "container count over quota"
                    );
                }
                decision
            }
            Route::ObjectWrite {
                version,
                account,
                container,
                object,
                size,
            } => {
                let attributes = ForwardedAttributes::from_headers(headers);
                let account_usage = match self
                    .resolver
                    .resolve_account(&attributes, version, account)
                    .await
                {
                    Ok(resolved) => resolved.usage,
                    Err(err) => {
                        warn!(account = %account, error = %err, "account metadata unavailable, skipping quota check");
                        return QuotaDecision::allow();
                    }
                };
                let container_usage = match self
                    .resolver
                    .resolve_container(&attributes, version, account, container)
                    .await
                {
                    Ok(resolved) => resolved.usage,
                    Err(err) => {
                        warn!(
                            account = %account,
                            container = %container,
                            error = %err,
                            "container metadata unavailable, skipping quota check"
                        );
                        return QuotaDecision::allow();
                    }
                };

                let decision =
                    evaluate_object_write(&account_usage, &container_usage, *size, &self.limits);
                match &decision.reason {
                    Some(violation) => info!(
                        account = %account,
                        container = %container,
                        object = %object,
                        tier = %account_usage.tier,
                        dimension = %violation.dimension(),
                        current = violation.current(),
                        quota = violation.limit(),
                        object_size = size,
                        "object write over quota"
                    ),
                    None => debug!(
                        account = %account,
                        container = %container,
                        bytes_used = container_usage.bytes_used,
                        object_count = container_usage.object_count,
                        object_size = size,
                        "object write within quota"
                    ),
                }
                decision
            }
        }
    }
}

fn reject(violation: &QuotaViolation) -> Response<ProxyBody> {
    let mut response = Response::new(full(violation.message()));
    *response.status_mut() = StatusCode::FORBIDDEN;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(
        CONTENT_LENGTH,
        HeaderValue::from(violation.message().len()),
    );
    response
}
