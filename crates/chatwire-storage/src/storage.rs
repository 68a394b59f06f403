use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseBackend,
    DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Schema, TransactionTrait,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;
use uuid::Uuid;

use chatwire_common::{GlobalConfig, SiteSettings};
use chatwire_protocol::Role;

use crate::db::connect_shared;
use crate::entities;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
}

pub const ADMIN_USER_ID: &str = "admin";

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub model_used: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelInput {
    pub name: String,
    pub model_id: String,
    pub provider: String,
    pub api_key: Option<String>,
    pub is_active: bool,
    pub supports_images: bool,
    pub supports_generation: bool,
}

/// Partial update of a model row; `None` leaves the column untouched.
/// `api_key: Some(None)` clears the key.
#[derive(Debug, Clone, Default)]
pub struct ModelPatch {
    pub name: Option<String>,
    pub model_id: Option<String>,
    pub provider: Option<String>,
    pub api_key: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub supports_images: Option<bool>,
    pub supports_generation: Option<bool>,
}

pub fn hash_token(token: &str) -> String {
    blake3::hash(token.trim().as_bytes()).to_hex().to_string()
}

#[derive(Clone)]
pub struct ChatStorage {
    db: DatabaseConnection,
}

impl ChatStorage {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = connect_shared(dsn).await?;
        Self::from_connection(db).await
    }

    pub async fn from_connection(db: DatabaseConnection) -> StorageResult<Self> {
        // Ensure sqlite enforces foreign keys (required for cascade + integrity).
        if db.get_database_backend() == DatabaseBackend::Sqlite {
            db.execute_unprepared("PRAGMA foreign_keys = ON").await?;
        }
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Users)
            .register(entities::Sessions)
            .register(entities::Conversations)
            .register(entities::Messages)
            .register(entities::AiModels)
            .register(entities::SiteSettings)
            .register(entities::GlobalConfig)
            .sync(&self.db)
            .await?;
        Ok(())
    }

    pub async fn health(&self) -> StorageResult<()> {
        entities::GlobalConfig::find()
            .order_by_asc(entities::global_config::Column::Id)
            .one(&self.db)
            .await?;
        Ok(())
    }

    // Global config

    pub async fn load_global_config(&self) -> StorageResult<Option<GlobalConfig>> {
        let row = entities::GlobalConfig::find_by_id(1i64).one(&self.db).await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.config_json)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_global_config(&self, config: &GlobalConfig) -> StorageResult<()> {
        use entities::global_config::Column;

        let active = entities::global_config::ActiveModel {
            id: ActiveValue::Set(1),
            config_json: ActiveValue::Set(serde_json::to_value(config)?),
            updated_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        entities::GlobalConfig::insert(active)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([Column::ConfigJson, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    // Users and sessions

    pub async fn ensure_admin_user(&self, admin_key: &str) -> StorageResult<()> {
        if entities::Users::find_by_id(ADMIN_USER_ID.to_string())
            .one(&self.db)
            .await?
            .is_none()
        {
            let active = entities::users::ActiveModel {
                id: ActiveValue::Set(ADMIN_USER_ID.to_string()),
                email: ActiveValue::Set("admin@localhost".to_string()),
                username: ActiveValue::Set("admin".to_string()),
                is_admin: ActiveValue::Set(true),
                created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
                ..Default::default()
            };
            active.insert(&self.db).await?;
            info!(user_id = ADMIN_USER_ID, "admin user created");
        }
        self.issue_session(ADMIN_USER_ID, admin_key).await
    }

    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        is_admin: bool,
    ) -> StorageResult<entities::users::Model> {
        let active = entities::users::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            email: ActiveValue::Set(email.trim().to_string()),
            username: ActiveValue::Set(username.trim().to_string()),
            is_admin: ActiveValue::Set(is_admin),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn get_user(&self, user_id: &str) -> StorageResult<Option<entities::users::Model>> {
        Ok(entities::Users::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?)
    }

    pub async fn list_users(&self) -> StorageResult<Vec<entities::users::Model>> {
        Ok(entities::Users::find()
            .order_by_asc(entities::users::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Idempotent: a token that is already registered is left as is.
    pub async fn issue_session(&self, user_id: &str, token: &str) -> StorageResult<()> {
        use entities::sessions::Column;

        let token_hash = hash_token(token);
        let existing = entities::Sessions::find()
            .filter(Column::TokenHash.eq(token_hash.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        let active = entities::sessions::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user_id.to_string()),
            token_hash: ActiveValue::Set(token_hash),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            last_used_at: ActiveValue::Set(None),
            ..Default::default()
        };
        entities::Sessions::insert(active).exec(&self.db).await?;
        Ok(())
    }

    pub async fn user_by_token(
        &self,
        token: &str,
    ) -> StorageResult<Option<entities::users::Model>> {
        use entities::sessions::Column;

        let Some(session) = entities::Sessions::find()
            .filter(Column::TokenHash.eq(hash_token(token)))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let user_id = session.user_id.clone();
        let mut active: entities::sessions::ActiveModel = session.into();
        active.last_used_at = ActiveValue::Set(Some(OffsetDateTime::now_utc()));
        active.update(&self.db).await?;
        self.get_user(&user_id).await
    }

    // Conversations

    pub async fn create_conversation(
        &self,
        owner: &str,
        owner_label: &str,
        title: &str,
    ) -> StorageResult<entities::conversations::Model> {
        let now = OffsetDateTime::now_utc();
        let active = entities::conversations::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            title: ActiveValue::Set(title.to_string()),
            user_uuid: ActiveValue::Set(owner.to_string()),
            user_id: ActiveValue::Set(owner_label.to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn get_conversation(
        &self,
        id: &str,
        owner: &str,
    ) -> StorageResult<Option<entities::conversations::Model>> {
        use entities::conversations::Column;

        Ok(entities::Conversations::find()
            .filter(Column::Id.eq(id))
            .filter(Column::UserUuid.eq(owner))
            .one(&self.db)
            .await?)
    }

    /// Newest activity first.
    pub async fn list_conversations(
        &self,
        owner: &str,
    ) -> StorageResult<Vec<entities::conversations::Model>> {
        use entities::conversations::Column;

        Ok(entities::Conversations::find()
            .filter(Column::UserUuid.eq(owner))
            .order_by_desc(Column::UpdatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn rename_conversation(
        &self,
        id: &str,
        owner: &str,
        title: &str,
    ) -> StorageResult<entities::conversations::Model> {
        let row = self
            .get_conversation(id, owner)
            .await?
            .ok_or(StorageError::NotFound("conversation"))?;
        let mut active: entities::conversations::ActiveModel = row.into();
        active.title = ActiveValue::Set(title.to_string());
        active.updated_at = ActiveValue::Set(OffsetDateTime::now_utc());
        Ok(active.update(&self.db).await?)
    }

    /// Removes the conversation and its messages. Returns `false` when the
    /// caller owns no such conversation.
    pub async fn delete_conversation(&self, id: &str, owner: &str) -> StorageResult<bool> {
        if self.get_conversation(id, owner).await?.is_none() {
            return Ok(false);
        }
        let txn = self.db.begin().await?;
        entities::Messages::delete_many()
            .filter(entities::messages::Column::ConversationId.eq(id))
            .exec(&txn)
            .await?;
        let result = entities::Conversations::delete_many()
            .filter(entities::conversations::Column::Id.eq(id))
            .filter(entities::conversations::Column::UserUuid.eq(owner))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    // Messages

    /// Inserts `messages` in order and touches each affected conversation's
    /// `updated_at`. Every target conversation must belong to `owner`.
    pub async fn insert_messages(
        &self,
        owner: &str,
        messages: Vec<NewMessage>,
    ) -> StorageResult<Vec<entities::messages::Model>> {
        let mut conversation_ids: Vec<String> = Vec::new();
        for message in &messages {
            if !conversation_ids.contains(&message.conversation_id) {
                conversation_ids.push(message.conversation_id.clone());
            }
        }
        for id in &conversation_ids {
            if self.get_conversation(id, owner).await?.is_none() {
                return Err(StorageError::NotFound("conversation"));
            }
        }

        let now = OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;
        let mut inserted = Vec::with_capacity(messages.len());
        for message in messages {
            let active = entities::messages::ActiveModel {
                id: ActiveValue::Set(Uuid::now_v7().to_string()),
                conversation_id: ActiveValue::Set(message.conversation_id),
                role: ActiveValue::Set(message.role.as_str().to_string()),
                content: ActiveValue::Set(message.content),
                model_used: ActiveValue::Set(message.model_used),
                created_at: ActiveValue::Set(now),
                ..Default::default()
            };
            inserted.push(active.insert(&txn).await?);
        }
        for id in conversation_ids {
            entities::Conversations::update_many()
                .col_expr(
                    entities::conversations::Column::UpdatedAt,
                    sea_orm::sea_query::Expr::value(now),
                )
                .filter(entities::conversations::Column::Id.eq(id))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;
        Ok(inserted)
    }

    pub async fn list_messages(
        &self,
        conversation_id: &str,
        owner: &str,
    ) -> StorageResult<Vec<entities::messages::Model>> {
        use entities::messages::Column;

        if self.get_conversation(conversation_id, owner).await?.is_none() {
            return Err(StorageError::NotFound("conversation"));
        }
        Ok(entities::Messages::find()
            .filter(Column::ConversationId.eq(conversation_id))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    // Model registry

    pub async fn list_models(&self) -> StorageResult<Vec<entities::ai_models::Model>> {
        Ok(entities::AiModels::find()
            .order_by_asc(entities::ai_models::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn list_active_models(&self) -> StorageResult<Vec<entities::ai_models::Model>> {
        use entities::ai_models::Column;

        Ok(entities::AiModels::find()
            .filter(Column::IsActive.eq(true))
            .order_by_asc(Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn active_model(
        &self,
        id: &str,
    ) -> StorageResult<Option<entities::ai_models::Model>> {
        use entities::ai_models::Column;

        Ok(entities::AiModels::find()
            .filter(Column::Id.eq(id))
            .filter(Column::IsActive.eq(true))
            .one(&self.db)
            .await?)
    }

    pub async fn create_model(
        &self,
        input: ModelInput,
    ) -> StorageResult<entities::ai_models::Model> {
        let now = OffsetDateTime::now_utc();
        let active = entities::ai_models::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            name: ActiveValue::Set(input.name),
            model_id: ActiveValue::Set(input.model_id),
            provider: ActiveValue::Set(input.provider),
            api_key: ActiveValue::Set(input.api_key),
            is_active: ActiveValue::Set(input.is_active),
            supports_images: ActiveValue::Set(input.supports_images),
            supports_generation: ActiveValue::Set(input.supports_generation),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        Ok(active.insert(&self.db).await?)
    }

    pub async fn update_model(
        &self,
        id: &str,
        patch: ModelPatch,
    ) -> StorageResult<entities::ai_models::Model> {
        let row = entities::AiModels::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("model"))?;
        let mut active: entities::ai_models::ActiveModel = row.into();
        if let Some(name) = patch.name {
            active.name = ActiveValue::Set(name);
        }
        if let Some(model_id) = patch.model_id {
            active.model_id = ActiveValue::Set(model_id);
        }
        if let Some(provider) = patch.provider {
            active.provider = ActiveValue::Set(provider);
        }
        if let Some(api_key) = patch.api_key {
            active.api_key = ActiveValue::Set(api_key);
        }
        if let Some(is_active) = patch.is_active {
            active.is_active = ActiveValue::Set(is_active);
        }
        if let Some(supports_images) = patch.supports_images {
            active.supports_images = ActiveValue::Set(supports_images);
        }
        if let Some(supports_generation) = patch.supports_generation {
            active.supports_generation = ActiveValue::Set(supports_generation);
        }
        active.updated_at = ActiveValue::Set(OffsetDateTime::now_utc());
        Ok(active.update(&self.db).await?)
    }

    pub async fn delete_model(&self, id: &str) -> StorageResult<bool> {
        let result = entities::AiModels::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    // Site settings

    pub async fn load_site_settings(&self) -> StorageResult<Option<SiteSettings>> {
        let row = entities::SiteSettings::find()
            .order_by_desc(entities::site_settings::Column::UpdatedAt)
            .one(&self.db)
            .await?;
        Ok(row.map(site_settings_from_row))
    }

    /// Single-row upsert keyed by `settings.id` (a fresh id when blank).
    pub async fn upsert_site_settings(&self, settings: SiteSettings) -> StorageResult<SiteSettings> {
        use entities::site_settings::Column;

        let id = if settings.id.trim().is_empty() {
            match self.load_site_settings().await? {
                Some(existing) => existing.id,
                None => Uuid::new_v4().to_string(),
            }
        } else {
            settings.id.clone()
        };
        let active = entities::site_settings::ActiveModel {
            id: ActiveValue::Set(id.clone()),
            site_name: ActiveValue::Set(settings.site_name),
            primary_color: ActiveValue::Set(settings.primary_color),
            secondary_color: ActiveValue::Set(settings.secondary_color),
            background_color: ActiveValue::Set(settings.background_color),
            text_color: ActiveValue::Set(settings.text_color),
            accent_color: ActiveValue::Set(settings.accent_color),
            logo_url: ActiveValue::Set(settings.logo_url),
            favicon_url: ActiveValue::Set(settings.favicon_url),
            welcome_message: ActiveValue::Set(settings.welcome_message),
            footer_text: ActiveValue::Set(settings.footer_text),
            font_family: ActiveValue::Set(settings.font_family),
            enable_dark_mode: ActiveValue::Set(settings.enable_dark_mode),
            max_message_length: ActiveValue::Set(
                i32::try_from(settings.max_message_length).unwrap_or(i32::MAX),
            ),
            enable_guest_access: ActiveValue::Set(settings.enable_guest_access),
            openrouter_api_key: ActiveValue::Set(settings.openrouter_api_key),
            openai_api_key: ActiveValue::Set(settings.openai_api_key),
            anthropic_api_key: ActiveValue::Set(settings.anthropic_api_key),
            gemini_api_key: ActiveValue::Set(settings.gemini_api_key),
            updated_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            ..Default::default()
        };
        entities::SiteSettings::insert(active)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::SiteName,
                        Column::PrimaryColor,
                        Column::SecondaryColor,
                        Column::BackgroundColor,
                        Column::TextColor,
                        Column::AccentColor,
                        Column::LogoUrl,
                        Column::FaviconUrl,
                        Column::WelcomeMessage,
                        Column::FooterText,
                        Column::FontFamily,
                        Column::EnableDarkMode,
                        Column::MaxMessageLength,
                        Column::EnableGuestAccess,
                        Column::OpenrouterApiKey,
                        Column::OpenaiApiKey,
                        Column::AnthropicApiKey,
                        Column::GeminiApiKey,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        let row = entities::SiteSettings::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(StorageError::NotFound("site settings"))?;
        Ok(site_settings_from_row(row))
    }
}

fn site_settings_from_row(row: entities::site_settings::Model) -> SiteSettings {
    SiteSettings {
        id: row.id,
        site_name: row.site_name,
        primary_color: row.primary_color,
        secondary_color: row.secondary_color,
        background_color: row.background_color,
        text_color: row.text_color,
        accent_color: row.accent_color,
        logo_url: row.logo_url,
        favicon_url: row.favicon_url,
        welcome_message: row.welcome_message,
        footer_text: row.footer_text,
        font_family: row.font_family,
        enable_dark_mode: row.enable_dark_mode,
        max_message_length: u32::try_from(row.max_message_length).unwrap_or_default(),
        enable_guest_access: row.enable_guest_access,
        openrouter_api_key: row.openrouter_api_key,
        openai_api_key: row.openai_api_key,
        anthropic_api_key: row.anthropic_api_key,
        gemini_api_key: row.gemini_api_key,
        updated_at: row.updated_at.format(&Rfc3339).ok(),
    }
}
