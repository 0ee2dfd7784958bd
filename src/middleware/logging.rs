//! Request logging middleware
//!
//! Tags every request with an `x-request-id` (generated when the client
//! does not send one) and emits one structured log line per request with
//! method, path, status and latency.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::info;
use uuid::Uuid;

/// Generates UUID v4 request ids for `SetRequestIdLayer`.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Log one line per handled request.
///
/// Runs inside `SetRequestIdLayer`, so the id header is already present
/// on the way in and `PropagateRequestIdLayer` copies it to the response.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let started = Instant::now();
    let response = next.run(request).await;
    let latency_ms = started.elapsed().as_millis();

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = latency_ms as u64,
        request_id = %request_id,
        "request handled"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn generated_request_ids_are_unique_header_values() {
        let mut maker = UuidRequestId;
        let request = Request::builder()
            .uri("/api/v1/payments")
            .body(Body::empty())
            .expect("request builds");

        let first = maker.make_request_id(&request).expect("id generated");
        let second = maker.make_request_id(&request).expect("id generated");
        assert_ne!(first.header_value(), second.header_value());

        let text = first
            .header_value()
            .to_str()
            .expect("uuid is valid ascii");
        assert_eq!(text.len(), 36);
    }
}
