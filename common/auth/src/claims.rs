use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Value of the `typ` claim carried by access tokens.
pub const ACCESS_TOKEN_TYPE: &str = "access_token";

/// Application-focused representation of verified JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claims {
    pub subject: Uuid,
    pub role: Role,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub audience: Vec<String>,
}

impl Claims {
    /// Time left before the token expires on its own, `None` once it has.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now)
            .to_std()
            .ok()
            .filter(|remaining| !remaining.is_zero())
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    role: String,
    jti: String,
    exp: i64,
    iat: i64,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
    #[serde(default)]
    typ: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

fn invalid_claim(name: &str, value: impl std::fmt::Display) -> AuthError {
    AuthError::InvalidToken(format!("invalid claim '{name}' with value '{value}'"))
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        match value.typ.as_deref() {
            Some(ACCESS_TOKEN_TYPE) => {}
            other => return Err(invalid_claim("typ", other.unwrap_or("<missing>"))),
        }

        let subject = Uuid::parse_str(&value.sub).map_err(|_| invalid_claim("sub", &value.sub))?;
        let token_id = Uuid::parse_str(&value.jti).map_err(|_| invalid_claim("jti", &value.jti))?;
        let role = value
            .role
            .parse::<Role>()
            .map_err(|_| invalid_claim("role", &value.role))?;

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| invalid_claim("exp", value.exp))?;
        let issued_at = Utc
            .timestamp_opt(value.iat, 0)
            .single()
            .ok_or_else(|| invalid_claim("iat", value.iat))?;

        let audience = match value.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            subject,
            role,
            token_id,
            issued_at,
            expires_at,
            issuer: value.iss,
            audience,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::InvalidToken(format!("malformed claims: {err}")))?;
        Claims::try_from(repr)
    }
}
