use std::sync::Arc;

use axum::http::HeaderMap;

use chatwire_core::{
    AuthContext, AuthProvider, ChatEngine, SettingsProvider, UpstreamClient,
};
use chatwire_storage::ChatStorage;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    pub storage: ChatStorage,
    pub auth: Arc<dyn AuthProvider>,
    pub settings: Arc<dyn SettingsProvider>,
    pub upstream: Arc<dyn UpstreamClient>,
}

impl AppState {
    pub async fn user(&self, headers: &HeaderMap) -> ApiResult<AuthContext> {
        Ok(self.auth.authenticate(headers).await?)
    }

    pub async fn admin(&self, headers: &HeaderMap) -> ApiResult<AuthContext> {
        Ok(self.auth.authenticate_admin(headers).await?)
    }

    /// Signed-in caller, or `None` for a guest when guest access is on.
    pub async fn user_or_guest(&self, headers: &HeaderMap) -> ApiResult<Option<AuthContext>> {
        match self.auth.identify(headers).await? {
            Some(ctx) => Ok(Some(ctx)),
            None if self.settings.get().enable_guest_access => Ok(None),
            None => Err(ApiError::from(chatwire_core::AuthError::unauthorized())),
        }
    }
}
