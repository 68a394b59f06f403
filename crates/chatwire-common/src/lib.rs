pub mod config;
pub mod provider;
pub mod settings;

pub use config::{GlobalConfig, GlobalConfigError, GlobalConfigPatch};
pub use provider::{ProviderCapabilities, ProviderKind};
pub use settings::{PublicSiteSettings, SiteSettings};
