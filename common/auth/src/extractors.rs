use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderValue};
use tracing::trace;

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// Per-request authentication progress. Requests move strictly forward and
/// leave through `Dispatched` or a rejection at the stage they reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Unauthenticated,
    TokenPresent,
    Validated,
    Authorized,
    Dispatched,
}

impl AuthStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStage::Unauthenticated => "unauthenticated",
            AuthStage::TokenPresent => "token_present",
            AuthStage::Validated => "validated",
            AuthStage::Authorized => "authorized",
            AuthStage::Dispatched => "dispatched",
        }
    }
}

/// Verified identity of the caller. Extracting it runs the full
/// authentication chain; handlers that take it are protected routes.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

/// Run the bearer header through the verifier. Framework-independent entry
/// point used by the axum extractor.
pub async fn authenticate(verifier: &JwtVerifier, headers: &HeaderMap) -> AuthResult<AuthContext> {
    let header_value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthorization)?;
    let token = parse_bearer(header_value)?;
    trace!(stage = AuthStage::TokenPresent.as_str(), "bearer token present");

    let claims = verifier.verify(&token).await?;
    trace!(
        stage = AuthStage::Validated.as_str(),
        subject = %claims.subject,
        "bearer token validated"
    );

    Ok(AuthContext { claims })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);
        authenticate(&verifier, &parts.headers).await
    }
}

fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let (scheme, token) = raw
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthorization)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthorization);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, SigningSecret};
    use crate::revocation::{InMemoryRevocationStore, RevocationGuard, RevocationPolicy};

    fn verifier() -> JwtVerifier {
        let config = JwtConfig::new(SigningSecret::new("secret").unwrap(), "iss", "aud");
        let guard = RevocationGuard::new(
            Arc::new(InMemoryRevocationStore::new()),
            RevocationPolicy::default(),
        );
        JwtVerifier::new(config, guard)
    }

    #[test]
    fn parse_bearer_accepts_valid_token() {
        let header = HeaderValue::from_static("Bearer abc.def.ghi");
        let token = parse_bearer(&header).expect("token");
        assert_eq!(token, "abc.def.ghi");

        let header = HeaderValue::from_static("bearer abc.def.ghi");
        assert_eq!(parse_bearer(&header).expect("lowercase scheme"), "abc.def.ghi");
    }

    #[test]
    fn parse_bearer_rejects_wrong_scheme() {
        let header = HeaderValue::from_static("Basic credentials");
        let err = parse_bearer(&header).expect_err("should reject");
        assert!(matches!(err, AuthError::InvalidAuthorization));
    }

    #[test]
    fn parse_bearer_rejects_empty_value() {
        let header = HeaderValue::from_static("Bearer    ");
        let err = parse_bearer(&header).expect_err("should reject empty token");
        assert!(matches!(err, AuthError::InvalidAuthorization));
    }

    #[tokio::test]
    async fn missing_header_is_rejected_before_token_stage() {
        let err = authenticate(&verifier(), &HeaderMap::new())
            .await
            .expect_err("no header");
        assert!(matches!(err, AuthError::MissingAuthorization));
        assert_eq!(err.stage(), AuthStage::Unauthenticated);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_at_token_stage() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer garbage"));
        let err = authenticate(&verifier(), &headers).await.expect_err("invalid");
        assert_eq!(err.stage(), AuthStage::TokenPresent);
    }
}
