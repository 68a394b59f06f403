use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

/// Per-request id, set by [`trace_requests`] and read by handlers.
#[derive(Debug, Clone)]
pub struct RequestTraceId(pub String);

pub async fn trace_requests(mut req: Request<Body>, next: Next) -> Response {
    let trace_id = uuid::Uuid::now_v7().to_string();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );
    req.extensions_mut().insert(RequestTraceId(trace_id.clone()));

    let started = Instant::now();
    let resp = next.run(req).await;
    // For streams this marks the headers going out, not the end of the body.
    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
    );
    resp
}
