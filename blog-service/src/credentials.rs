use std::sync::Arc;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::users::{User, UserStore};

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Unknown email or wrong password. Callers must not tell the two apart.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is disabled")]
    Inactive,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Checks an email/password pair against stored argon2 hashes.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
    hasher: Argon2<'static>,
    // Verified against when the email is unknown so both paths cost the same.
    dummy_hash: String,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserStore>, hasher: Argon2<'static>) -> Result<Self, CredentialError> {
        let dummy_hash = hash_with(&hasher, "placeholder-password-never-matches")?;
        Ok(Self {
            users,
            hasher,
            dummy_hash,
        })
    }

    pub fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        if password.trim().is_empty() {
            return Err(CredentialError::EmptyPassword);
        }
        hash_with(&self.hasher, password)
    }

    pub async fn verify(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let Some(user) = self.users.find_by_email(email).await else {
            let _ = self.password_matches(&self.dummy_hash, password);
            debug!("login for unknown email");
            return Err(CredentialError::InvalidCredentials);
        };

        if !self.password_matches(&user.password_hash, password) {
            debug!(user_id = %user.id, "password mismatch");
            return Err(CredentialError::InvalidCredentials);
        }

        if !user.is_active() {
            return Err(CredentialError::Inactive);
        }

        Ok(user)
    }

    fn password_matches(&self, stored: &str, candidate: &str) -> bool {
        match PasswordHash::new(stored) {
            Ok(parsed) => self
                .hasher
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                warn!(error = %err, "stored password hash is unparseable");
                false
            }
        }
    }
}

fn hash_with(hasher: &Argon2<'static>, password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CredentialError::Hashing(err.to_string()))
}
