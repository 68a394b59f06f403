use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::info;

use chatwire_common::SiteSettings;
use chatwire_storage::{ChatStorage, StorageResult};

/// Where site settings are loaded from. `None` means no row was ever saved.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load_settings(&self) -> StorageResult<Option<SiteSettings>>;
}

#[async_trait]
impl SettingsSource for ChatStorage {
    async fn load_settings(&self) -> StorageResult<Option<SiteSettings>> {
        self.load_site_settings().await
    }
}

/// Explicit settings handle: read the current snapshot, refresh on demand.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    fn get(&self) -> Arc<SiteSettings>;
    async fn refresh(&self) -> StorageResult<Arc<SiteSettings>>;
}

pub struct CachedSettings {
    source: Arc<dyn SettingsSource>,
    snapshot: ArcSwap<SiteSettings>,
}

impl CachedSettings {
    /// Loads once; defaults are used until a row exists.
    pub async fn load(source: Arc<dyn SettingsSource>) -> StorageResult<Self> {
        let initial = source.load_settings().await?.unwrap_or_default();
        Ok(Self {
            source,
            snapshot: ArcSwap::from_pointee(initial),
        })
    }

    pub fn replace(&self, settings: SiteSettings) {
        self.snapshot.store(Arc::new(settings));
    }
}

#[async_trait]
impl SettingsProvider for CachedSettings {
    fn get(&self) -> Arc<SiteSettings> {
        self.snapshot.load_full()
    }

    async fn refresh(&self) -> StorageResult<Arc<SiteSettings>> {
        let next = Arc::new(self.source.load_settings().await?.unwrap_or_default());
        self.snapshot.store(next.clone());
        info!(site_name = %next.site_name, "site settings refreshed");
        Ok(next)
    }
}

/// Fixed settings, for tests and the terminal client.
pub struct StaticSettings(pub Arc<SiteSettings>);

#[async_trait]
impl SettingsProvider for StaticSettings {
    fn get(&self) -> Arc<SiteSettings> {
        self.0.clone()
    }

    async fn refresh(&self) -> StorageResult<Arc<SiteSettings>> {
        Ok(self.0.clone())
    }
}
