use chatwire_common::SiteSettings;
use chatwire_protocol::Role;
use chatwire_storage::{
    ADMIN_USER_ID, ChatStorage, ModelInput, ModelPatch, NewMessage, StorageError,
};
use sea_orm::Database;

async fn storage() -> ChatStorage {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let storage = ChatStorage::from_connection(db).await.unwrap();
    storage.sync().await.unwrap();
    storage
}

fn model_input(name: &str, active: bool) -> ModelInput {
    ModelInput {
        name: name.to_string(),
        model_id: format!("openai/{name}"),
        provider: "openrouter".to_string(),
        api_key: None,
        is_active: active,
        supports_images: false,
        supports_generation: true,
    }
}

#[tokio::test]
async fn admin_token_resolves_to_admin_user() {
    let storage = storage().await;
    storage.ensure_admin_user("pwd").await.unwrap();
    storage.ensure_admin_user("pwd").await.unwrap();

    let user = storage.user_by_token("pwd").await.unwrap().unwrap();
    assert_eq!(user.id, ADMIN_USER_ID);
    assert!(user.is_admin);
    assert!(storage.user_by_token("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn messages_keep_insertion_order_and_touch_conversation() {
    let storage = storage().await;
    let user = storage.create_user("a@b.c", "a", false).await.unwrap();
    let conversation = storage
        .create_conversation(&user.id, &user.email, "Hi")
        .await
        .unwrap();

    let inserted = storage
        .insert_messages(
            &user.id,
            vec![
                NewMessage {
                    conversation_id: conversation.id.clone(),
                    role: Role::User,
                    content: "Hi".to_string(),
                    model_used: None,
                },
                NewMessage {
                    conversation_id: conversation.id.clone(),
                    role: Role::Assistant,
                    content: "Hello!".to_string(),
                    model_used: Some("X".to_string()),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted.len(), 2);

    let listed = storage
        .list_messages(&conversation.id, &user.id)
        .await
        .unwrap();
    let contents: Vec<_> = listed.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["Hi", "Hello!"]);
    assert_eq!(listed[1].role, "assistant");
    assert_eq!(listed[1].model_used.as_deref(), Some("X"));

    let touched = storage
        .get_conversation(&conversation.id, &user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(touched.updated_at >= conversation.updated_at);
}

#[tokio::test]
async fn conversations_are_owner_filtered() {
    let storage = storage().await;
    let alice = storage.create_user("alice@x", "alice", false).await.unwrap();
    let bob = storage.create_user("bob@x", "bob", false).await.unwrap();
    let conversation = storage
        .create_conversation(&alice.id, &alice.email, "mine")
        .await
        .unwrap();

    assert!(
        storage
            .get_conversation(&conversation.id, &bob.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        storage
            .rename_conversation(&conversation.id, &bob.id, "stolen")
            .await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        storage
            .insert_messages(
                &bob.id,
                vec![NewMessage {
                    conversation_id: conversation.id.clone(),
                    role: Role::User,
                    content: "x".to_string(),
                    model_used: None,
                }],
            )
            .await,
        Err(StorageError::NotFound(_))
    ));
    assert!(!storage.delete_conversation(&conversation.id, &bob.id).await.unwrap());

    let renamed = storage
        .rename_conversation(&conversation.id, &alice.id, "renamed")
        .await
        .unwrap();
    assert_eq!(renamed.title, "renamed");
    assert!(storage.delete_conversation(&conversation.id, &alice.id).await.unwrap());
    assert!(storage.list_conversations(&alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn only_active_models_resolve() {
    let storage = storage().await;
    let active = storage.create_model(model_input("gpt-4o", true)).await.unwrap();
    let inactive = storage.create_model(model_input("old", false)).await.unwrap();

    assert!(storage.active_model(&active.id).await.unwrap().is_some());
    assert!(storage.active_model(&inactive.id).await.unwrap().is_none());
    assert_eq!(storage.list_active_models().await.unwrap().len(), 1);

    let updated = storage
        .update_model(
            &inactive.id,
            ModelPatch {
                is_active: Some(true),
                api_key: Some(Some("sk-model".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_active);
    assert_eq!(updated.api_key.as_deref(), Some("sk-model"));
    assert_eq!(updated.name, "old");

    assert!(storage.delete_model(&active.id).await.unwrap());
    assert!(!storage.delete_model(&active.id).await.unwrap());
}

#[tokio::test]
async fn site_settings_upsert_keeps_single_row() {
    let storage = storage().await;
    assert!(storage.load_site_settings().await.unwrap().is_none());

    let saved = storage
        .upsert_site_settings(SiteSettings {
            site_name: "Parlor".to_string(),
            openrouter_api_key: Some("sk-or".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!saved.id.is_empty());

    let again = storage
        .upsert_site_settings(SiteSettings {
            site_name: "Parlor 2".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(again.id, saved.id);

    let loaded = storage.load_site_settings().await.unwrap().unwrap();
    assert_eq!(loaded.site_name, "Parlor 2");
    assert_eq!(loaded.openrouter_api_key, None);
    assert_eq!(loaded.max_message_length, 4000);
}
