use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use common_auth::{authorize, Action, AuthContext, Resource, Role};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::credentials::CredentialError;
use crate::error::{ServiceError, ServiceResult};
use crate::extractors::ActiveUser;
use crate::tokens::{IssuedToken, TokenSubject};
use crate::users::{normalize_email, AccountStatus, PublicUser, User};
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: String,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            access_token: issued.access_token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
            expires_at: issued.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub user: PublicUser,
    /// Role captured in the token at issue time.
    pub token_role: Role,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: AccountStatus,
}

#[derive(Deserialize)]
pub struct ForcedRevocation {
    pub token_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RevocationReceipt {
    pub token_id: Uuid,
    pub ttl_seconds: u64,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ServiceResult<(StatusCode, Json<PublicUser>)> {
    let RegisterRequest {
        email,
        password,
        full_name,
        role,
    } = request;

    let email = validate_email(&email)?;
    let role = match role.as_deref() {
        None => Role::default(),
        Some(raw) => parse_role(raw)?,
    };
    if role == Role::Admin {
        return Err(ApiError::bad_request(
            "admin_role_not_self_assignable",
            "Admin accounts cannot be self-registered",
        )
        .into());
    }

    let password_hash = state.credentials.hash_password(&password)?;
    let user = state
        .users
        .insert(User {
            id: Uuid::new_v4(),
            email,
            full_name: full_name.filter(|name| !name.trim().is_empty()),
            password_hash,
            role,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        })
        .await?;

    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ServiceResult<Json<LoginResponse>> {
    let LoginRequest { email, password } = request;

    let user = match state.credentials.verify(&email, &password).await {
        Ok(user) => user,
        Err(err) => {
            let outcome = match err {
                CredentialError::InvalidCredentials => "invalid_credentials",
                CredentialError::Inactive => "inactive",
                _ => "error",
            };
            state.metrics.login_attempt(outcome);
            return Err(err.into());
        }
    };

    let issued = state
        .token_issuer
        .issue(TokenSubject {
            user_id: user.id,
            role: user.role,
        })
        .map_err(|err| {
            error!(user_id = %user.id, error = ?err, "Failed to issue access token");
            state.metrics.login_attempt("error");
            ServiceError::from(ApiError::internal(err))
        })?;

    state.metrics.login_attempt("success");
    info!(user_id = %user.id, token_id = %issued.token_id, "user logged in");
    Ok(Json(LoginResponse::from(issued)))
}

/// Revoke the presented token for the rest of its lifetime. A second logout
/// with the same token never gets here: the extractor already rejects it.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ServiceResult<Json<MessageResponse>> {
    let claims = auth.into_claims();
    state.jwt_verifier.revoke(&claims).await?;
    state.metrics.revocation("logout");
    info!(user_id = %claims.subject, token_id = %claims.token_id, "user logged out");
    Ok(Json(MessageResponse {
        message: "Successfully logged out",
    }))
}

pub async fn test_token(ActiveUser { auth, user }: ActiveUser) -> ServiceResult<Json<TokenInfo>> {
    let claims = auth.into_claims();
    Ok(Json(TokenInfo {
        user: PublicUser::from(&user),
        token_role: claims.role,
        token_id: claims.token_id,
        expires_at: claims.expires_at,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
) -> ServiceResult<Json<Vec<PublicUser>>> {
    authorize(state.access.as_ref(), &auth, Resource::User, Action::Read, None)?;
    let users = state.users.list().await;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

/// Tokens already issued keep the role they were issued with.
pub async fn update_user_role(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(user_id): Path<Uuid>,
    Json(update): Json<RoleUpdate>,
) -> ServiceResult<Json<PublicUser>> {
    authorize(state.access.as_ref(), &auth, Resource::User, Action::Update, None)?;
    let role = parse_role(&update.role)?;
    let user = state.users.update_role(user_id, role).await?;
    info!(
        user_id = %user.id,
        role = %user.role,
        changed_by = %auth.claims.subject,
        "user role updated"
    );
    Ok(Json(PublicUser::from(&user)))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Path(user_id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ServiceResult<Json<PublicUser>> {
    authorize(state.access.as_ref(), &auth, Resource::User, Action::Update, None)?;
    if user_id == auth.claims.subject && update.status == AccountStatus::Disabled {
        return Err(ApiError::bad_request(
            "cannot_disable_self",
            "Administrators cannot disable their own account",
        )
        .into());
    }
    let user = state.users.set_status(user_id, update.status).await?;
    info!(user_id = %user.id, status = ?user.status, "user status updated");
    Ok(Json(PublicUser::from(&user)))
}

/// Revoke a token by id without holding the token itself. The expiry is
/// unknown here, so the entry lives for the configured forced-revocation TTL.
pub async fn force_revoke(
    State(state): State<AppState>,
    ActiveUser { auth, .. }: ActiveUser,
    Json(request): Json<ForcedRevocation>,
) -> ServiceResult<(StatusCode, Json<RevocationReceipt>)> {
    authorize(state.access.as_ref(), &auth, Resource::Session, Action::Delete, None)?;
    let ttl = state.config.forced_revocation_ttl();
    state
        .jwt_verifier
        .revocations()
        .revoke(&request.token_id.to_string(), ttl)
        .await?;
    state.metrics.revocation("forced");
    warn!(
        token_id = %request.token_id,
        revoked_by = %auth.claims.subject,
        "token force-revoked"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(RevocationReceipt {
            token_id: request.token_id,
            ttl_seconds: ttl.as_secs(),
        }),
    ))
}

fn parse_role(raw: &str) -> Result<Role, ServiceError> {
    raw.parse::<Role>().map_err(|err| {
        ApiError::bad_request("invalid_role", format!("{err}. Allowed roles: admin, author, reader"))
            .into()
    })
}

fn validate_email(raw: &str) -> Result<String, ServiceError> {
    let email = normalize_email(raw);
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ApiError::bad_request("invalid_email", "A valid email address is required").into())
    }
}
