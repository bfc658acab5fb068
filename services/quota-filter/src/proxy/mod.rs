mod body;
mod error;
mod upstream;

pub use body::{boxed, empty, full, BoxError, ProxyBody};
pub use error::ProxyError;
pub use upstream::UpstreamClient;

use async_trait::async_trait;
use http::{Request, Response};

/// The next hop in the request pipeline.
///
/// Admitted writes are forwarded through it, and metadata probes are answered
/// by it, the same way a storage proxy serves both. Request and response
/// bodies stream through untouched.
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn call(&self, req: Request<ProxyBody>) -> Result<Response<ProxyBody>, ProxyError>;
}
