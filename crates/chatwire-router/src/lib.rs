//! HTTP surface of the chat relay.

pub mod admin;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod public;
pub mod state;
pub mod trace;
pub mod views;

use axum::Router;
use axum::middleware;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use trace::RequestTraceId;

/// Every route, with request tracing applied on top.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(public::public_router(state.clone()))
        .merge(chat::chat_router(state.clone()))
        .merge(conversations::conversations_router(state.clone()))
        .merge(admin::admin_router(state))
        .layer(middleware::from_fn(trace::trace_requests))
}
