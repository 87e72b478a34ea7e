use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::revocation::RevocationGuard;

/// The single authentication checkpoint: signature, then expiry, then
/// revocation, short-circuiting on the first failure.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    decoding_key: DecodingKey,
    revocations: RevocationGuard,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig, revocations: RevocationGuard) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.expose());
        Self {
            config,
            decoding_key,
            revocations,
        }
    }

    pub fn revocations(&self) -> &RevocationGuard {
        &self.revocations
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.leeway = self.config.leeway_seconds.into();
        validation
    }

    /// Signature and expiry checks only. Does not consult the revocation store.
    pub fn decode(&self, token: &str) -> AuthResult<Claims> {
        let token_data = decode::<Value>(token, &self.decoding_key, &self.validation())?;
        Claims::try_from(token_data.claims)
    }

    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.decode(token)?;
        let token_id = claims.token_id.to_string();
        if self.revocations.is_revoked(&token_id).await? {
            return Err(AuthError::RevokedToken(token_id));
        }
        debug!(subject = %claims.subject, token_id = %token_id, "verified JWT successfully");
        Ok(claims)
    }

    /// Revoke the token described by `claims` for the rest of its lifetime.
    /// Returns `false` when the token had already expired and nothing was stored.
    pub async fn revoke(&self, claims: &Claims) -> AuthResult<bool> {
        match claims.remaining_ttl(Utc::now()) {
            Some(ttl) => {
                self.revocations
                    .revoke(&claims.token_id.to_string(), ttl)
                    .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
