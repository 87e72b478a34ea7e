use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// User as returned over the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            status: user.status,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),
    #[error("user {0} not found")]
    NotFound(Uuid),
}

/// Lookup key for emails: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, UserStoreError>;
    async fn find_by_email(&self, email: &str) -> Option<User>;
    async fn find_by_id(&self, id: Uuid) -> Option<User>;
    async fn list(&self) -> Vec<User>;
    async fn update_role(&self, id: Uuid, role: Role) -> Result<User, UserStoreError>;
    async fn set_status(&self, id: Uuid, status: AccountStatus) -> Result<User, UserStoreError>;
}

#[derive(Default)]
struct UserTable {
    by_id: HashMap<Uuid, User>,
    email_index: HashMap<String, Uuid>,
}

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    inner: Arc<RwLock<UserTable>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, mut user: User) -> Result<User, UserStoreError> {
        let key = normalize_email(&user.email);
        let mut table = self.inner.write().await;
        if table.email_index.contains_key(&key) {
            return Err(UserStoreError::DuplicateEmail(key));
        }
        user.email = key.clone();
        table.email_index.insert(key, user.id);
        table.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        let table = self.inner.read().await;
        table
            .email_index
            .get(&normalize_email(email))
            .and_then(|id| table.by_id.get(id))
            .cloned()
    }

    async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    async fn list(&self) -> Vec<User> {
        let table = self.inner.read().await;
        let mut users: Vec<User> = table.by_id.values().cloned().collect();
        users.sort_by_key(|user| user.created_at);
        users
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<User, UserStoreError> {
        let mut table = self.inner.write().await;
        let user = table.by_id.get_mut(&id).ok_or(UserStoreError::NotFound(id))?;
        user.role = role;
        Ok(user.clone())
    }

    async fn set_status(&self, id: Uuid, status: AccountStatus) -> Result<User, UserStoreError> {
        let mut table = self.inner.write().await;
        let user = table.by_id.get_mut(&id).ok_or(UserStoreError::NotFound(id))?;
        user.status = status;
        Ok(user.clone())
    }
}
