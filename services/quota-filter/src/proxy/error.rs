use http::{Response, StatusCode};
use serde_json::json;
use thiserror::Error;

use super::body::{full, ProxyBody};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) | ProxyError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn to_response(&self, request_id: Option<&str>) -> Response<ProxyBody> {
        let error_code = match self {
            ProxyError::Upstream(_) => "UPSTREAM_ERROR",
            ProxyError::InvalidResponse(_) => "INVALID_UPSTREAM_RESPONSE",
        };

        let body_json = json!({
            "error": error_code,
            "message": self.to_string(),
            "request_id": request_id,
        });

        let mut response = Response::new(full(body_json.to_string()));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }
}
