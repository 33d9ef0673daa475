use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use tw_guard::Rejection;

/// JSON error body shared by every endpoint:
/// `{ "success": false, "error": <message>, "code": <CODE> }`.
#[derive(Error, Debug)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub remaining: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            remaining: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PARAMS", message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "AUTHENTICATION_REQUIRED",
            "please sign in to download",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }
}

impl From<tw_core::Error> for ApiError {
    fn from(e: tw_core::Error) -> Self {
        use tw_core::Error;
        match e {
            Error::Validation(_) | Error::InvalidUrl(_) | Error::Parse(_) => Self::invalid_params(e.to_string()),
            Error::InvalidTransition { .. } => Self::new(StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string()),
            Error::SourceDisabled(_) => Self::new(StatusCode::FORBIDDEN, "SOURCE_DISABLED", e.to_string()),
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string()),
            other => {
                // details stay in the log
                error!("🚨 Request failed: {}", other);
                Self::internal()
            }
        }
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        let status = StatusCode::from_u16(rejection.status()).unwrap_or(StatusCode::FORBIDDEN);
        Self {
            status,
            code: rejection.code(),
            message: rejection.to_string(),
            remaining: rejection.remaining(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        });
        if let Some(remaining) = self.remaining {
            body["remaining"] = json!(remaining);
        }
        let mut response = (self.status, Json(body)).into_response();
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static("3600"));
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
