use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::Argon2;
use axum::extract::{FromRef, State};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use common_auth::{AccessPolicy, JwtVerifier, RevocationGuard, RevocationStore, Role, RoleTable};
use common_http_errors::ApiError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::content::ContentStore;
use crate::credentials::CredentialVerifier;
use crate::metrics::{track_errors, AuthMetrics};
use crate::post_handlers::{
    create_comment, create_post, delete_comment, delete_post, get_comment, get_post,
    list_comments, list_posts, update_comment, update_post,
};
use crate::tokens::TokenIssuer;
use crate::user_handlers::{
    force_revoke, list_users, login, logout, register, test_token, update_user_role,
    update_user_status,
};
use crate::users::{AccountStatus, InMemoryUserStore, User, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub content: ContentStore,
    pub credentials: CredentialVerifier,
    pub token_issuer: Arc<TokenIssuer>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub access: Arc<dyn AccessPolicy>,
    pub config: Arc<ServiceConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl AppState {
    /// Wire every component from config. `revocations` is the shared store;
    /// `hasher` carries the argon2 cost parameters.
    pub fn new(
        config: ServiceConfig,
        revocations: Arc<dyn RevocationStore>,
        hasher: Argon2<'static>,
    ) -> Result<Self> {
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let credentials = CredentialVerifier::new(users.clone(), hasher)
            .context("Failed to initialise password hashing")?;
        let token_issuer = TokenIssuer::new(&config.jwt, config.token_config())
            .context("Failed to initialise token issuer")?;
        let guard = RevocationGuard::new(revocations, config.revocation.clone());
        let jwt_verifier = JwtVerifier::new(config.jwt.clone(), guard);
        let metrics = AuthMetrics::new().context("Failed to register metrics")?;

        Ok(Self {
            users,
            content: ContentStore::new(),
            credentials,
            token_issuer: Arc::new(token_issuer),
            jwt_verifier: Arc::new(jwt_verifier),
            access: Arc::new(RoleTable),
            config: Arc::new(config),
            metrics: Arc::new(metrics),
        })
    }

    /// Create the configured bootstrap admin unless the email is already taken.
    pub async fn seed_bootstrap_admin(&self) -> Result<()> {
        let Some(admin) = &self.config.bootstrap_admin else {
            return Ok(());
        };

        if let Some(existing) = self.users.find_by_email(&admin.email).await {
            if existing.role != Role::Admin {
                warn!(user_id = %existing.id, "bootstrap admin email belongs to a non-admin user");
            }
            return Ok(());
        }

        let password_hash = self
            .credentials
            .hash_password(&admin.password)
            .context("Failed to hash bootstrap admin password")?;
        let user = self
            .users
            .insert(User {
                id: Uuid::new_v4(),
                email: admin.email.clone(),
                full_name: None,
                password_hash,
                role: Role::Admin,
                status: AccountStatus::Active,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to create bootstrap admin")?;
        info!(user_id = %user.id, "bootstrap admin created");
        Ok(())
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => ApiError::internal(err).into_response(),
    }
}

pub fn build_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let cors = cors_layer(&state.config.cors_origins);

    let router = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/test-token", post(test_token))
        .route("/auth/revocations", post(force_revoke))
        .route("/users", get(list_users))
        .route("/users/:user_id/role", put(update_user_role))
        .route("/users/:user_id/status", put(update_user_status))
        .route("/posts", post(create_post).get(list_posts))
        .route(
            "/posts/:post_id",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route(
            "/posts/:post_id/comments",
            post(create_comment).get(list_comments),
        )
        .route(
            "/comments/:comment_id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .with_state(state)
        .layer(middleware::from_fn_with_state(metrics, track_errors));

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]),
    )
}
