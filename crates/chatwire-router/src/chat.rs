use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use chatwire_core::ChatRequest;

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::trace::RequestTraceId;

const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const SSE_HEARTBEAT_FRAME: &[u8] = b": keep-alive\n\n";

pub fn chat_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat", post(chat_once))
        .with_state(state)
}

async fn chat_stream(
    State(state): State<AppState>,
    Extension(trace): Extension<RequestTraceId>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Response> {
    let caller = state.user_or_guest(&headers).await?;
    info!(
        trace_id = %trace.0,
        user_id = caller.as_ref().map(|c| c.user_id.as_str()).unwrap_or("guest"),
        model_id = %request.model_id,
        "chat stream requested"
    );

    let stream = state.engine.stream(request, &trace.0).await?;
    let frames = with_heartbeat(stream.body);
    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));

    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("x-accel-buffering", HeaderValue::from_static("no"));
    Ok(resp)
}

async fn chat_once(
    State(state): State<AppState>,
    Extension(trace): Extension<RequestTraceId>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Response> {
    state.user_or_guest(&headers).await?;
    let completion = state.engine.complete(request, &trace.0).await?;
    Ok((StatusCode::OK, Json(completion)).into_response())
}

/// Interleaves `: keep-alive` comments into an idle SSE body.
fn with_heartbeat(mut frames: mpsc::Receiver<Bytes>) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel::<Bytes>(32);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SSE_HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                next = frames.recv() => {
                    let Some(chunk) = next else {
                        break;
                    };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(Bytes::from_static(SSE_HEARTBEAT_FRAME)).await.is_err() {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }
    });
    rx
}
