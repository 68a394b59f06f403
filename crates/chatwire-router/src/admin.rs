use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer};
use tracing::info;

use chatwire_common::{ProviderKind, SiteSettings};
use chatwire_core::{CatalogQuery, search_models};
use chatwire_storage::{ModelInput, ModelPatch};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::views::{ModelView, UserView};

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/api/admin/models", get(list_models).post(create_model))
        .route(
            "/api/admin/models/{id}",
            patch(update_model).delete(delete_model),
        )
        .route(
            "/api/admin/settings",
            get(get_settings).post(save_settings),
        )
        .route("/api/admin/search-models", post(search_catalog))
        .route("/api/admin/users", get(list_users).post(create_user))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth))
        .with_state(state)
}

async fn admin_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    state.admin(&headers).await?;
    Ok(next.run(req).await)
}

#[derive(Debug, Deserialize)]
struct CreateModelBody {
    name: String,
    model_id: String,
    #[serde(default = "default_provider")]
    provider: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_true")]
    is_active: bool,
    #[serde(default)]
    supports_images: bool,
    #[serde(default)]
    supports_generation: bool,
}

fn default_provider() -> String {
    ProviderKind::OpenRouter.as_str().to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct UpdateModelBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    provider: Option<String>,
    /// Absent leaves the key alone; `null` or `""` clears it.
    #[serde(default, deserialize_with = "present")]
    api_key: Option<Option<String>>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    supports_images: Option<bool>,
    #[serde(default)]
    supports_generation: Option<bool>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn normalize_provider(raw: &str) -> ApiResult<String> {
    ProviderKind::parse(raw)
        .map(|kind| kind.as_str().to_string())
        .ok_or_else(|| ApiError::bad_request(format!("Unknown provider '{}'", raw.trim())))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn list_models(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let models: Vec<ModelView> = state
        .storage
        .list_models()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(serde_json::json!({ "models": models })))
}

async fn create_model(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateModelBody>,
) -> ApiResult<Json<ModelView>> {
    let name = body.name.trim().to_string();
    let model_id = body.model_id.trim().to_string();
    if name.is_empty() || model_id.is_empty() {
        return Err(ApiError::bad_request("Name and model ID are required"));
    }
    let input = ModelInput {
        name,
        model_id,
        provider: normalize_provider(&body.provider)?,
        api_key: non_blank(body.api_key),
        is_active: body.is_active,
        supports_images: body.supports_images,
        supports_generation: body.supports_generation,
    };
    let row = state.storage.create_model(input).await?;
    info!(model = %row.id, provider = %row.provider, "model registered");
    Ok(Json(row.into()))
}

async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<UpdateModelBody>,
) -> ApiResult<Json<ModelView>> {
    let provider = match body.provider.as_deref() {
        Some(raw) => Some(normalize_provider(raw)?),
        None => None,
    };
    let patch = ModelPatch {
        name: non_blank(body.name),
        model_id: non_blank(body.model_id),
        provider,
        api_key: body.api_key.map(non_blank),
        is_active: body.is_active,
        supports_images: body.supports_images,
        supports_generation: body.supports_generation,
    };
    let row = state.storage.update_model(&id, patch).await?;
    Ok(Json(row.into()))
}

async fn delete_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.storage.delete_model(&id).await? {
        return Err(ApiError::not_found("Model not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn get_settings(State(state): State<AppState>) -> Json<SiteSettings> {
    Json(state.settings.get().as_ref().clone())
}

async fn save_settings(
    State(state): State<AppState>,
    ApiJson(settings): ApiJson<SiteSettings>,
) -> ApiResult<Json<SiteSettings>> {
    if settings.max_message_length == 0 {
        return Err(ApiError::bad_request("max_message_length must be positive"));
    }
    let saved = state.storage.upsert_site_settings(settings).await?;
    state.settings.refresh().await?;
    info!(site_name = %saved.site_name, "site settings saved");
    Ok(Json(saved))
}

async fn search_catalog(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CatalogQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    // Fall back to the stored OpenRouter key when the form sent none.
    let api_key = non_blank(body.api_key)
        .or_else(|| {
            state
                .settings
                .get()
                .api_key_for(ProviderKind::OpenRouter)
                .map(str::to_string)
        })
        .unwrap_or_default();
    let models = search_models(state.upstream.as_ref(), &api_key, body.query.as_deref()).await?;
    Ok(Json(serde_json::json!({ "models": models })))
}

#[derive(Debug, Deserialize)]
struct CreateUserBody {
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    is_admin: bool,
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let users: Vec<UserView> = state
        .storage
        .list_users()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(serde_json::json!({ "users": users })))
}

/// Creates a user and hands back its session token. Only the hash is kept,
/// so this response is the one chance to read it.
async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUserBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let email = body.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    let username = non_blank(body.username).unwrap_or_else(|| {
        email
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or(email)
            .to_string()
    });
    let user = state
        .storage
        .create_user(email, &username, body.is_admin)
        .await?;
    let token = new_session_token();
    state.storage.issue_session(&user.id, &token).await?;
    info!(user_id = %user.id, is_admin = user.is_admin, "user provisioned");
    Ok(Json(serde_json::json!({
        "user": UserView::from(user),
        "token": token,
    })))
}

fn new_session_token() -> String {
    let seed = format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::now_v7());
    format!("cw_{}", blake3::hash(seed.as_bytes()).to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_patch_distinguishes_absent_and_null() {
        let absent: UpdateModelBody = serde_json::from_str(r#"{"name":"A"}"#).unwrap();
        assert_eq!(absent.api_key, None);

        let cleared: UpdateModelBody = serde_json::from_str(r#"{"api_key":null}"#).unwrap();
        assert_eq!(cleared.api_key, Some(None));

        let set: UpdateModelBody = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert_eq!(set.api_key, Some(Some("k".to_string())));
    }

    #[test]
    fn provider_names_are_normalized() {
        assert_eq!(normalize_provider(" OpenAI ").unwrap(), "openai");
        assert!(normalize_provider("mistral").is_err());
    }

    #[test]
    fn session_tokens_are_unique() {
        let a = new_session_token();
        assert!(a.starts_with("cw_"));
        assert_ne!(a, new_session_token());
    }
}
