use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use chatwire_protocol::Role;
use chatwire_storage::NewMessage;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;
use crate::views::{ConversationView, MessageView};

pub fn conversations_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            patch(rename_conversation).delete(delete_conversation),
        )
        .route("/api/conversations/{id}/messages", get(list_messages))
        .route("/api/messages", post(create_messages))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateConversationBody {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    title: String,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    conversation_id: String,
    role: Role,
    content: String,
    #[serde(default)]
    model_used: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateMessagesBody {
    messages: Vec<IncomingMessage>,
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state.user(&headers).await?;
    let rows = state.storage.list_conversations(&user.user_id).await?;
    let conversations: Vec<ConversationView> = rows.into_iter().map(Into::into).collect();
    Ok(Json(serde_json::json!({ "conversations": conversations })))
}

async fn create_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateConversationBody>,
) -> ApiResult<Json<ConversationView>> {
    let user = state.user(&headers).await?;
    let title = body.title.trim();
    let title = if title.is_empty() { "New conversation" } else { title };
    let label = if user.email.is_empty() {
        user.user_id.as_str()
    } else {
        user.email.as_str()
    };
    let row = state
        .storage
        .create_conversation(&user.user_id, label, title)
        .await?;
    Ok(Json(row.into()))
}

async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RenameBody>,
) -> ApiResult<Json<ConversationView>> {
    let user = state.user(&headers).await?;
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("Title is required"));
    }
    let row = state
        .storage
        .rename_conversation(&id, &user.user_id, title)
        .await?;
    Ok(Json(row.into()))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state.user(&headers).await?;
    if !state.storage.delete_conversation(&id, &user.user_id).await? {
        return Err(ApiError::not_found("Conversation not found"));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user = state.user(&headers).await?;
    let rows = state.storage.list_messages(&id, &user.user_id).await?;
    let messages: Vec<MessageView> = rows.into_iter().map(Into::into).collect();
    Ok(Json(serde_json::json!({ "messages": messages })))
}

async fn create_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateMessagesBody>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let user = state.user(&headers).await?;
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("Messages are required"));
    }
    let messages = body
        .messages
        .into_iter()
        .map(|message| NewMessage {
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            model_used: message.model_used.filter(|model| !model.is_empty()),
        })
        .collect();
    let rows = state.storage.insert_messages(&user.user_id, messages).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
