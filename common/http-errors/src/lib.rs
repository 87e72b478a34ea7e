use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use tracing::error;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: Option<String> },
    Unauthorized { code: &'static str },
    Forbidden { code: &'static str },
    NotFound { code: &'static str },
    Conflict { code: &'static str, message: Option<String> },
    /// Detail is logged, never sent to the client.
    Internal { detail: String },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { detail: e.to_string() } }
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self { Self::BadRequest { code, message: Some(message.into()) } }
    pub fn not_found(code: &'static str) -> Self { Self::NotFound { code } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (body, error_code) = match self {
            ApiError::BadRequest { code, message } | ApiError::Conflict { code, message } => (
                ErrorBody { code: code.into(), message },
                code
            ),
            ApiError::Unauthorized { code }
            | ApiError::Forbidden { code }
            | ApiError::NotFound { code } => (
                ErrorBody { code: code.into(), message: None },
                code
            ),
            ApiError::Internal { detail } => {
                error!(%detail, "internal error");
                (ErrorBody { code: "internal_error".into(), message: None }, "internal_error")
            }
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}
