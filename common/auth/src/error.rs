use axum::http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::errors::ErrorKind;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::extractors::AuthStage;
use crate::guards::{Action, Resource};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token rejected: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    ExpiredToken,
    #[error("token '{0}' has been revoked")]
    RevokedToken(String),
    #[error("role may not {action} {resource}")]
    Forbidden { resource: Resource, action: Action },
    #[error("revocation store unavailable: {0}")]
    CacheUnavailable(String),
    #[error("auth configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Stage of the request pipeline at which the request was rejected.
    pub fn stage(&self) -> AuthStage {
        match self {
            AuthError::MissingAuthorization
            | AuthError::InvalidAuthorization
            | AuthError::Configuration(_) => AuthStage::Unauthenticated,
            AuthError::InvalidToken(_)
            | AuthError::ExpiredToken
            | AuthError::RevokedToken(_)
            | AuthError::CacheUnavailable(_) => AuthStage::TokenPresent,
            AuthError::Forbidden { .. } => AuthStage::Validated,
        }
    }

    /// Low-cardinality label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorization => "missing_header",
            AuthError::InvalidAuthorization => "malformed_header",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::RevokedToken(_) => "revoked_token",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::CacheUnavailable(_) => "cache_unavailable",
            AuthError::Configuration(_) => "configuration",
        }
    }

    /// True for failures that map to 401. These share one response body.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MissingAuthorization
                | AuthError::InvalidAuthorization
                | AuthError::InvalidToken(_)
                | AuthError::ExpiredToken
                | AuthError::RevokedToken(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => Self::ExpiredToken,
            _ => Self::InvalidToken(value.to_string()),
        }
    }
}

/// Attached to rejection responses as an extension so outer layers can
/// label the failure without parsing the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRejection {
    pub stage: AuthStage,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let rejection = AuthRejection {
            stage: self.stage(),
            reason: self.reason(),
        };
        let stage = rejection.stage.as_str();
        let reason = rejection.reason;

        let (status, code, message) = match &self {
            err if err.is_authentication_failure() => {
                debug!(stage, reason, error = %err, "request not authenticated");
                (
                    StatusCode::UNAUTHORIZED,
                    "UNAUTHORIZED",
                    "Could not validate credentials",
                )
            }
            AuthError::Forbidden { .. } => {
                warn!(stage, reason, error = %self, "request not authorized");
                (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "You do not have permission to perform this action",
                )
            }
            AuthError::CacheUnavailable(_) => {
                error!(stage, reason, error = %self, "denying request, revocation state unknown");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "AUTH_UNAVAILABLE",
                    "Authentication is temporarily unavailable",
                )
            }
            _ => {
                error!(stage, reason, error = %self, "authentication misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERVER_ERROR",
                    "Internal server error",
                )
            }
        };

        let mut response = (status, Json(ErrorBody { code, message })).into_response();
        response.extensions_mut().insert(rejection);
        response
            .headers_mut()
            .insert("X-Error-Code", HeaderValue::from_static(code));
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
