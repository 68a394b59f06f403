//! JSON shapes returned by the API. Storage rows stay inside the server.

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use chatwire_storage::entities::{ai_models, conversations, messages, users};

pub fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub id: String,
    pub title: String,
    pub user_uuid: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<conversations::Model> for ConversationView {
    fn from(row: conversations::Model) -> Self {
        Self {
            id: row.id,
            title: row.title,
            user_uuid: row.user_uuid,
            user_id: row.user_id,
            created_at: rfc3339(row.created_at),
            updated_at: rfc3339(row.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub model_used: Option<String>,
    pub created_at: String,
}

impl From<messages::Model> for MessageView {
    fn from(row: messages::Model) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            role: row.role,
            content: row.content,
            model_used: row.model_used,
            created_at: rfc3339(row.created_at),
        }
    }
}

/// Admin view of a registry row. Includes whether a key is set, never the key.
#[derive(Debug, Serialize)]
pub struct ModelView {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub provider: String,
    pub has_api_key: bool,
    pub is_active: bool,
    pub supports_images: bool,
    pub supports_generation: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ai_models::Model> for ModelView {
    fn from(row: ai_models::Model) -> Self {
        Self {
            id: row.id,
            name: row.name,
            model_id: row.model_id,
            provider: row.provider,
            has_api_key: row.api_key.is_some_and(|key| !key.trim().is_empty()),
            is_active: row.is_active,
            supports_images: row.supports_images,
            supports_generation: row.supports_generation,
            created_at: rfc3339(row.created_at),
            updated_at: rfc3339(row.updated_at),
        }
    }
}

/// What the chat model picker needs.
#[derive(Debug, Serialize)]
pub struct PublicModelView {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub supports_images: bool,
    pub supports_generation: bool,
}

impl From<ai_models::Model> for PublicModelView {
    fn from(row: ai_models::Model) -> Self {
        Self {
            id: row.id,
            name: row.name,
            provider: row.provider,
            supports_images: row.supports_images,
            supports_generation: row.supports_generation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<users::Model> for UserView {
    fn from(row: users::Model) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            is_admin: row.is_admin,
            created_at: rfc3339(row.created_at),
        }
    }
}
