use async_trait::async_trait;
use http::{HeaderMap, StatusCode, header};

use chatwire_storage::ChatStorage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub status: StatusCode,
    pub message: String,
}

impl AuthError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Admin access required")
    }
}

/// Identity seam. Sessions are owned elsewhere; the relay only asks who is
/// calling.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` when the request carries no credential at all.
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<AuthContext>, AuthError>;

    async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        self.identify(headers)
            .await?
            .ok_or_else(AuthError::unauthorized)
    }

    async fn authenticate_admin(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let ctx = self.authenticate(headers).await?;
        if !ctx.is_admin {
            return Err(AuthError::forbidden());
        }
        Ok(ctx)
    }
}

/// Bearer session tokens checked against the `sessions` table.
#[derive(Clone)]
pub struct StorageAuth {
    storage: ChatStorage,
}

impl StorageAuth {
    pub fn new(storage: ChatStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AuthProvider for StorageAuth {
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<AuthContext>, AuthError> {
        let Some(token) = extract_bearer(headers) else {
            return Ok(None);
        };
        let user = self
            .storage
            .user_by_token(&token)
            .await
            .map_err(|err| AuthError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
            .ok_or_else(AuthError::unauthorized)?;
        Ok(Some(AuthContext {
            user_id: user.id,
            email: user.email,
            username: user.username,
            is_admin: user.is_admin,
        }))
    }
}

/// `Authorization: Bearer <token>`, case-insensitive scheme.
pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = "Bearer ";
    let scheme = auth.get(..prefix.len())?;
    if !scheme.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let token = auth[prefix.len()..].trim();
    (!token.is_empty()).then(|| token.to_string())
}
