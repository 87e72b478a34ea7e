use axum::response::{IntoResponse, Response};
use common_auth::{AuthError, AuthRejection, AuthStage};
use common_http_errors::ApiError;

use crate::credentials::CredentialError;
use crate::users::UserStoreError;

/// Error type returned by handlers. Authentication and authorization
/// failures keep their own response shape; everything else is an `ApiError`.
#[derive(Debug)]
pub enum ServiceError {
    Auth(AuthError),
    Api(ApiError),
    /// Valid token, but the account behind it has been disabled.
    AccountInactive,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<AuthError> for ServiceError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<ApiError> for ServiceError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<CredentialError> for ServiceError {
    fn from(value: CredentialError) -> Self {
        match value {
            // Same 401 body for unknown email and wrong password.
            CredentialError::InvalidCredentials => Self::Api(ApiError::Unauthorized {
                code: "invalid_credentials",
            }),
            CredentialError::Inactive => Self::Api(ApiError::Forbidden {
                code: "account_inactive",
            }),
            CredentialError::EmptyPassword => Self::Api(ApiError::bad_request(
                "invalid_password",
                "Password must not be empty",
            )),
            CredentialError::Hashing(detail) => Self::Api(ApiError::internal(detail)),
        }
    }
}

impl From<UserStoreError> for ServiceError {
    fn from(value: UserStoreError) -> Self {
        match value {
            UserStoreError::DuplicateEmail(_) => Self::Api(ApiError::Conflict {
                code: "email_taken",
                message: Some("The user with this email already exists".to_string()),
            }),
            UserStoreError::NotFound(_) => Self::Api(ApiError::not_found("user_not_found")),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            ServiceError::Auth(err) => err.into_response(),
            ServiceError::Api(err) => err.into_response(),
            ServiceError::AccountInactive => {
                let mut response = ApiError::Forbidden {
                    code: "account_inactive",
                }
                .into_response();
                response.extensions_mut().insert(AuthRejection {
                    stage: AuthStage::Validated,
                    reason: "account_inactive",
                });
                response
            }
        }
    }
}
