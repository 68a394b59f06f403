use std::error::Error;
use std::sync::Arc;

use tracing::info;

use chatwire_common::GlobalConfigPatch;
use chatwire_core::{
    CachedSettings, ChatEngine, SettingsProvider, StorageAuth, UpstreamClient,
    UpstreamClientConfig, WreqUpstreamClient,
};
use chatwire_router::{AppState, app_router};
use chatwire_storage::ChatStorage;

use crate::cli::ServeArgs;
use crate::data_dir::resolve_data_dir;
use crate::dsn::resolve_dsn;

pub(crate) async fn run(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let data_dir = resolve_data_dir(args.data_dir.as_deref());
    let dsn = resolve_dsn(args.dsn.as_deref(), &data_dir)?;
    let storage = ChatStorage::connect(&dsn).await?;
    info!(dsn = %dsn, "db connected");
    storage.sync().await?;

    // CLI and env (merged by clap) override the stored row, which is then
    // written back.
    let mut patch = storage
        .load_global_config()
        .await?
        .map(GlobalConfigPatch::from)
        .unwrap_or_default();
    patch.overlay(args.patch(&dsn, &data_dir));
    let config = patch.into_config()?;
    storage.upsert_global_config(&config).await?;
    info!(
        host = %config.host,
        port = config.port,
        dsn = %config.dsn,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        site_url = %config.site_url,
        "config loaded"
    );

    storage.ensure_admin_user(&config.admin_key).await?;
    info!("admin user ensured");

    let settings: Arc<dyn SettingsProvider> =
        Arc::new(CachedSettings::load(Arc::new(storage.clone())).await?);
    info!(site_name = %settings.get().site_name, "site settings loaded");

    let upstream: Arc<dyn UpstreamClient> = Arc::new(WreqUpstreamClient::new(
        UpstreamClientConfig::from_global(&config),
    )?);
    let engine = Arc::new(ChatEngine::new(
        upstream.clone(),
        Arc::new(storage.clone()),
        settings.clone(),
        config.site_url.clone(),
    ));
    let state = AppState {
        engine,
        storage: storage.clone(),
        auth: Arc::new(StorageAuth::new(storage)),
        settings,
        upstream,
    };

    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
