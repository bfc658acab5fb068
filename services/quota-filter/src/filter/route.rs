use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method};

use crate::path::decode_segment;

/// A request path split into `/{version}/{account}[/{container}[/{object}]]`.
///
/// Segments are percent-decoded. Empty container or object segments read as
/// absent; the object keeps any `/` it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    pub version: String,
    pub account: Option<String>,
    pub container: Option<String>,
    pub object: Option<String>,
}

impl ResourcePath {
    pub fn parse(path: &str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        let mut segments = rest.splitn(4, '/');

        let version = decode_segment(segments.next()?)?;
        if version.is_empty() {
            return None;
        }

        let mut next = || -> Option<Option<String>> {
            match segments.next() {
                Some(raw) => decode_segment(raw).map(|s| Some(s).filter(|s| !s.is_empty())),
                None => Some(None),
            }
        };

        let account = next()?;
        let container = next()?;
        let object = next()?;

        Some(Self {
            version,
            account,
            container,
            object,
        })
    }
}

/// What the filter has to check before letting a request through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Passthrough,
    ContainerCreate {
        version: String,
        account: String,
        container: String,
    },
    ObjectWrite {
        version: String,
        account: String,
        container: String,
        object: String,
        size: u64,
    },
}

impl Route {
    pub fn classify(method: &Method, path: &str, headers: &HeaderMap) -> Self {
        if method != Method::PUT {
            return Route::Passthrough;
        }

        let Some(resource) = ResourcePath::parse(path) else {
            return Route::Passthrough;
        };

        match resource {
            ResourcePath {
                version,
                account: Some(account),
                container: Some(container),
                object: None,
            } => Route::ContainerCreate {
                version,
                account,
                container,
            },
            ResourcePath {
                version,
                account: Some(account),
                container: Some(container),
                object: Some(object),
            } => Route::ObjectWrite {
                version,
                account,
                container,
                object,
                size: content_length(headers),
            },
            _ => Route::Passthrough,
        }
    }
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
