pub mod ai_models;
pub mod conversations;
pub mod global_config;
pub mod messages;
pub mod sessions;
pub mod site_settings;
pub mod users;

pub use ai_models::Entity as AiModels;
pub use conversations::Entity as Conversations;
pub use global_config::Entity as GlobalConfig;
pub use messages::Entity as Messages;
pub use sessions::Entity as Sessions;
pub use site_settings::Entity as SiteSettings;
pub use users::Entity as Users;
