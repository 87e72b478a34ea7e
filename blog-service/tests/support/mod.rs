#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::body::Body;
use axum::http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use blog_service::config::{from_lookup, ServiceConfig};
use blog_service::{build_router, AppState};
use common_auth::{InMemoryRevocationStore, RevocationStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@blog.test";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub fn test_config(overrides: &[(&str, &str)]) -> Result<ServiceConfig> {
    let mut values: HashMap<String, String> = [
        ("JWT_SECRET", "integration-test-secret"),
        ("JWT_ISSUER", "blog-platform"),
        ("JWT_AUDIENCE", "blog-api"),
        ("REVOCATION_TIMEOUT_MS", "50"),
        ("REVOCATION_RETRY_BACKOFF_MS", "5"),
        ("BOOTSTRAP_ADMIN_EMAIL", ADMIN_EMAIL),
        ("BOOTSTRAP_ADMIN_PASSWORD", ADMIN_PASSWORD),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        values.insert(key.to_string(), value.to_string());
    }
    from_lookup(move |key: &str| values.get(key).cloned())
}

/// Low-cost argon2 parameters so tests do not spend seconds per hash.
pub fn cheap_hasher() -> Argon2<'static> {
    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(1024, 1, 1, None).expect("argon2 params"),
    )
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_store(Arc::new(InMemoryRevocationStore::new()), &[]).await
    }

    pub async fn with_store(
        store: Arc<dyn RevocationStore>,
        overrides: &[(&str, &str)],
    ) -> Result<Self> {
        let config = test_config(overrides)?;
        let state = AppState::new(config, store, cheap_hasher())?;
        state.seed_bootstrap_admin().await?;
        let router = build_router(state.clone());
        Ok(Self { state, router })
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Ok(Response {
            status,
            headers,
            body,
        })
    }

    pub async fn register(&self, email: &str, password: &str, role: &str) -> Result<Value> {
        let response = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "email": email, "password": password, "role": role })),
            )
            .await?;
        anyhow::ensure!(
            response.status == StatusCode::CREATED,
            "register failed: {} {}",
            response.status,
            response.body
        );
        Ok(response.body)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let response = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await?;
        anyhow::ensure!(
            response.status == StatusCode::OK,
            "login failed: {} {}",
            response.status,
            response.body
        );
        response.body["access_token"]
            .as_str()
            .map(str::to_owned)
            .context("access_token missing from login response")
    }

    /// Register a user with `role` and return a fresh access token for it.
    pub async fn user_token(&self, email: &str, role: &str) -> Result<String> {
        self.register(email, "pa55word!", role).await?;
        self.login(email, "pa55word!").await
    }

    pub async fn admin_token(&self) -> Result<String> {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }
}
