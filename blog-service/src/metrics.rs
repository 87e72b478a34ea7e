use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, header::AUTHORIZATION, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use common_auth::{AuthRejection, AuthStage};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::trace;

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    rejections: IntCounterVec,
    dispatched: IntCounter,
    revocations: IntCounterVec,
    store_failures: IntCounter,
    http_errors: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new(
                "auth_rejections_total",
                "Requests rejected by the auth chain grouped by stage and reason",
            ),
            &["stage", "reason"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let dispatched = IntCounter::new(
            "auth_dispatched_total",
            "Requests carrying credentials that passed the auth chain and reached a handler",
        )?;
        registry.register(Box::new(dispatched.clone()))?;

        let revocations = IntCounterVec::new(
            Opts::new("auth_revocations_total", "Tokens revoked grouped by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(revocations.clone()))?;

        let store_failures = IntCounter::new(
            "auth_revocation_store_failures_total",
            "Requests that failed because the revocation store was unreachable",
        )?;
        registry.register(Box::new(store_failures.clone()))?;

        let http_errors = IntCounterVec::new(
            Opts::new(
                "http_errors_total",
                "Error responses grouped by X-Error-Code and status",
            ),
            &["code", "status"],
        )?;
        registry.register(Box::new(http_errors.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            rejections,
            dispatched,
            revocations,
            store_failures,
            http_errors,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn revocation(&self, kind: &str) {
        self.revocations.with_label_values(&[kind]).inc();
    }

    pub fn rejection(&self, rejection: AuthRejection) {
        self.rejections
            .with_label_values(&[rejection.stage.as_str(), rejection.reason])
            .inc();
        if rejection.reason == "cache_unavailable" {
            self.store_failures.inc();
        }
    }

    pub fn dispatched(&self) {
        self.dispatched.inc();
    }

    pub fn http_error(&self, code: &str, status: StatusCode) {
        self.http_errors
            .with_label_values(&[code, status.as_str()])
            .inc();
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}

/// Counts error responses by their `X-Error-Code` and auth rejections by
/// stage. A request that presented credentials and came back without a
/// rejection went through the whole chain and was dispatched.
pub async fn track_errors(
    State(metrics): State<Arc<AuthMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let credentialed = request.headers().contains_key(AUTHORIZATION);
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;

    match response.extensions().get::<AuthRejection>() {
        Some(rejection) => metrics.rejection(*rejection),
        None if credentialed => {
            trace!(
                stage = AuthStage::Dispatched.as_str(),
                %method,
                path = %path,
                status = response.status().as_u16(),
                "request dispatched"
            );
            metrics.dispatched();
        }
        None => {}
    }
    if let Some(code) = response
        .headers()
        .get("X-Error-Code")
        .and_then(|value| value.to_str().ok())
    {
        metrics.http_error(code, response.status());
    }

    response
}
