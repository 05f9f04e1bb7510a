use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures that end a request before (or instead of) an execution result.
///
/// Outcomes of the sandboxed program itself (non-zero exit, timeout, spawn
/// failure) are not errors at this level; they travel inside `ExecutionResult`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Code contains potentially dangerous operations")]
    SecurityViolation,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited { retry_after_secs: u64 },
    #[error("Internal server error")]
    Internal { message: String },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: String,
    retry_after: u64,
}

#[derive(Debug, Serialize)]
struct InternalBody {
    error: String,
    message: String,
}

impl ServiceError {
    /// Builds an internal error whose detail is only exposed in development mode.
    pub fn internal(err: impl std::fmt::Display, development: bool) -> Self {
        let message = if development {
            err.to_string()
        } else {
            "Something went wrong".to_string()
        };
        Self::Internal { message }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::SecurityViolation => "security_violation",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal { .. } => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::SecurityViolation => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        match self {
            Self::RateLimited { retry_after_secs } => {
                let mut response = (
                    status,
                    Json(RateLimitedBody {
                        error,
                        retry_after: retry_after_secs,
                    }),
                )
                    .into_response();
                if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, v);
                }
                response
            }
            Self::Internal { message } => {
                (status, Json(InternalBody { error, message })).into_response()
            }
            _ => (status, Json(ErrorBody { error })).into_response(),
        }
    }
}
