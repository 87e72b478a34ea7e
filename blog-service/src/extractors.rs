use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common_auth::{AuthContext, AuthError};
use tracing::warn;

use crate::error::ServiceError;
use crate::users::User;
use crate::AppState;

/// An authenticated caller whose account is still active. Protected routes
/// take this instead of a bare [`AuthContext`] so that disabling an account
/// cuts off tokens issued before it was disabled.
#[derive(Debug, Clone)]
pub struct ActiveUser {
    pub auth: AuthContext,
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for ActiveUser {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        let user = state
            .users
            .find_by_id(auth.claims.subject)
            .await
            .ok_or_else(|| AuthError::InvalidToken("token subject has no account".to_string()))?;

        if !user.is_active() {
            warn!(
                user_id = %user.id,
                token_id = %auth.claims.token_id,
                "token presented for a disabled account"
            );
            return Err(ServiceError::AccountInactive);
        }

        Ok(Self { auth, user })
    }
}
