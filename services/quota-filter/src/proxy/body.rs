use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request and response body type carried through the filter.
///
/// Bodies are streamed, never buffered, so object size is bounded only by
/// the storage proxy.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// Box any streaming body, e.g. a connection's `Incoming`.
pub fn boxed<B>(body: B) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}

pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty() -> ProxyBody {
    full(Bytes::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_body_collects() {
        let collected = full("created").collect().await.unwrap().to_bytes();
        assert_eq!(collected, "created");
        assert!(empty().is_end_stream());
    }
}
