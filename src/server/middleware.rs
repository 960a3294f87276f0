//! Request logging and correlation ID propagation.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{Instrument, info, info_span};

use crate::types::CorrelationId;

/// Header carrying a caller-supplied correlation ID.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Reads the correlation ID header, if present and non-empty.
pub fn correlation_id(request: &Request) -> Option<CorrelationId> {
    request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(CorrelationId::new)
}

/// Wraps each request in a span and logs its arrival and completion.
///
/// The correlation ID, when the caller sent one, is recorded on the span and
/// stored in the request extensions for handlers. None is generated.
pub async fn trace_requests(mut request: Request, next: Next) -> Response {
    let correlation = correlation_id(&request);
    let span = info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        correlation_id = correlation.as_ref().map(|id| id.as_str()),
    );
    if let Some(id) = correlation {
        request.extensions_mut().insert(id);
    }

    async move {
        let started = Instant::now();
        info!("Incoming request");

        let response = next.run(request).await;

        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );
        response
    }
    .instrument(span)
    .await
}
