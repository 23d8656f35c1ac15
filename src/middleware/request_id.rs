//! Request id propagation.
//!
//! Every request gets an id, either taken from an inbound `x-request-id`
//! or `x-correlation-id` header or freshly generated, stored in the request
//! extensions, attached to the tracing span, and echoed on the response.

use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub static CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

#[derive(Debug, Clone)]
pub struct RequestId(pub Arc<str>);

impl RequestId {
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = inbound_or_generated(&request);

    request.extensions_mut().insert(request_id.clone());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }
    response
}

fn inbound_or_generated(request: &Request) -> RequestId {
    [&REQUEST_ID_HEADER, &CORRELATION_ID_HEADER]
        .iter()
        .find_map(|header| {
            request
                .headers()
                .get(*header)
                .and_then(|v| v.to_str().ok())
                .filter(|id| is_safe_id(id))
                .map(RequestId::from_string)
        })
        .unwrap_or_default()
}

// Inbound ids end up in log lines and response headers; reject anything
// that is not plain token material.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

pub trait RequestIdExt {
    fn request_id(&self) -> RequestId;
}

impl RequestIdExt for Request {
    fn request_id(&self) -> RequestId {
        self.extensions()
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(RequestId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RequestId::new().as_str(), RequestId::new().as_str());
    }

    #[test]
    fn test_round_trips_through_string() {
        let id = RequestId::from_string("req-abc-123");
        assert_eq!(id.as_str(), "req-abc-123");
        assert_eq!(format!("{}", id), "req-abc-123");
    }

    #[test]
    fn test_accepts_token_material() {
        assert!(is_safe_id("abc123"));
        assert!(is_safe_id("abc-123_XYZ"));
        assert!(is_safe_id("a".repeat(128).as_str()));
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("abc 123"));
        assert!(!is_safe_id("abc@123"));
        assert!(!is_safe_id("abc/123"));
        assert!(!is_safe_id("a".repeat(129).as_str()));
    }
}
