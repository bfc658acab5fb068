use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request};

use super::MetadataError;
use crate::path::encode_segment;

pub const TRANS_ID_HEADER: &str = "x-trans-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const REMOTE_USER_HEADER: &str = "x-remote-user";
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

const PROBE_USER_AGENT_SUFFIX: &str = "Quota";

/// Attributes of the client request that may travel with a metadata probe.
///
/// Everything else on the client request (body, write method, credentials)
/// stays behind.
#[derive(Debug, Clone, Default)]
pub struct ForwardedAttributes {
    pub trans_id: Option<HeaderValue>,
    pub request_id: Option<HeaderValue>,
    pub remote_user: Option<HeaderValue>,
    pub host: Option<HeaderValue>,
    pub user_agent: Option<HeaderValue>,
}

impl ForwardedAttributes {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            trans_id: headers.get(TRANS_ID_HEADER).cloned(),
            request_id: headers.get(REQUEST_ID_HEADER).cloned(),
            remote_user: headers.get(REMOTE_USER_HEADER).cloned(),
            host: headers.get(HOST).cloned(),
            user_agent: headers.get(USER_AGENT).cloned(),
        }
    }
}

/// Builds the read-only `HEAD` request used to fetch account or container counters.
#[derive(Debug)]
pub struct ProbeRequestBuilder<'a> {
    path: String,
    attributes: Option<&'a ForwardedAttributes>,
    auth_token: Option<&'a str>,
}

impl<'a> ProbeRequestBuilder<'a> {
    pub fn account(version: &str, account: &str) -> Self {
        Self::for_segments(&[version, account])
    }

    pub fn container(version: &str, account: &str, container: &str) -> Self {
        Self::for_segments(&[version, account, container])
    }

    fn for_segments(segments: &[&str]) -> Self {
        let path = segments.iter().fold(String::new(), |mut path, segment| {
            path.push('/');
            path.push_str(&encode_segment(segment));
            path
        });

        Self {
            path,
            attributes: None,
            auth_token: None,
        }
    }

    pub fn forwarded(mut self, attributes: &'a ForwardedAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn auth_token(mut self, token: Option<&'a str>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn build(self) -> Result<Request<Bytes>, MetadataError> {
        let mut builder = Request::builder().method(Method::HEAD).uri(&self.path);

        let headers = builder
            .headers_mut()
            .ok_or_else(|| MetadataError::Probe(format!("invalid probe path {}", self.path)))?;

        let user_agent = self
            .attributes
            .and_then(|attrs| attrs.user_agent.as_ref())
            .and_then(|ua| ua.to_str().ok())
            .and_then(|ua| HeaderValue::from_str(&format!("{ua} {PROBE_USER_AGENT_SUFFIX}")).ok())
            .unwrap_or_else(|| HeaderValue::from_static(PROBE_USER_AGENT_SUFFIX));
        headers.insert(USER_AGENT, user_agent);

        if let Some(attrs) = self.attributes {
            let forwarded = [
                (HeaderName::from_static(TRANS_ID_HEADER), &attrs.trans_id),
                (HeaderName::from_static(REQUEST_ID_HEADER), &attrs.request_id),
                (HeaderName::from_static(REMOTE_USER_HEADER), &attrs.remote_user),
                (HOST, &attrs.host),
            ];
            for (name, value) in forwarded {
                if let Some(value) = value {
                    headers.insert(name, value.clone());
                }
            }
        }

        if let Some(token) = self.auth_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| MetadataError::Probe(format!("invalid probe token: {e}")))?;
            headers.insert(HeaderName::from_static(AUTH_TOKEN_HEADER), value);
        }

        Ok(builder.body(Bytes::new())?)
    }
}
