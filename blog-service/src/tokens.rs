use chrono::{DateTime, Duration, Utc};
use common_auth::{AuthError, AuthResult, JwtConfig, Role, ACCESS_TOKEN_TYPE};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on the access token lifetime: one year.
pub const MAX_ACCESS_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub access_ttl_seconds: i64,
}

pub struct TokenIssuer {
    config: TokenConfig,
    issuer: String,
    audience: String,
    encoding_key: EncodingKey,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub token_type: &'static str,
}

impl TokenIssuer {
    pub fn new(jwt: &JwtConfig, config: TokenConfig) -> AuthResult<Self> {
        if config.access_ttl_seconds <= 0 {
            return Err(AuthError::Configuration(
                "access token lifetime must be positive".to_string(),
            ));
        }
        if config.access_ttl_seconds > MAX_ACCESS_TTL_SECONDS {
            return Err(AuthError::Configuration(format!(
                "access token lifetime must not exceed {MAX_ACCESS_TTL_SECONDS} seconds"
            )));
        }

        Ok(Self {
            config,
            issuer: jwt.issuer.clone(),
            audience: jwt.audience.clone(),
            encoding_key: EncodingKey::from_secret(jwt.secret.expose()),
        })
    }

    pub fn issue(&self, subject: TokenSubject) -> AuthResult<IssuedToken> {
        self.issue_at(subject, Utc::now())
    }

    /// Sign an access token as if issued at `now`. Every call mints a fresh
    /// token id, so two logins never share a revocation key.
    pub fn issue_at(&self, subject: TokenSubject, now: DateTime<Utc>) -> AuthResult<IssuedToken> {
        let expires_at = Duration::try_seconds(self.config.access_ttl_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::Configuration("access token expiry is out of range".to_string())
            })?;
        let token_id = Uuid::new_v4();

        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            role: subject.role.as_str(),
            jti: token_id.to_string(),
            iss: &self.issuer,
            aud: &self.audience,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            typ: ACCESS_TOKEN_TYPE,
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Configuration(format!("failed to sign access token: {err}")))?;

        Ok(IssuedToken {
            access_token,
            token_id,
            issued_at: now,
            expires_at,
            expires_in: self.config.access_ttl_seconds,
            token_type: "bearer",
        })
    }
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: String,
    role: &'a str,
    jti: String,
    iss: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
    typ: &'a str,
}
