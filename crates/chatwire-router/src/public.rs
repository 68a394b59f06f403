use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use chatwire_common::PublicSiteSettings;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::views::PublicModelView;

pub fn public_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/settings", get(settings))
        .route("/api/models", get(models))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.health().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "ok": true }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "ok": false, "error": err.to_string() })),
        ),
    }
}

async fn settings(State(state): State<AppState>) -> Json<PublicSiteSettings> {
    Json(state.settings.get().public())
}

async fn models(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let models: Vec<PublicModelView> = state
        .storage
        .list_active_models()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(serde_json::json!({ "models": models })))
}
