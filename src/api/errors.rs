use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::db::types::AttemptState;
use crate::services::engine::AttemptError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<AttemptState>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    Validation(String),
    NotFound(String),
    AttemptClosed(AttemptState),
    AttemptsExhausted(String),
    ExamNotAvailable(String),
    PaperNotReady(String),
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::AttemptClosed(_) => (StatusCode::CONFLICT, "attempt_closed"),
            Self::AttemptsExhausted(_) => (StatusCode::CONFLICT, "attempts_exhausted"),
            Self::ExamNotAvailable(_) => (StatusCode::BAD_REQUEST, "exam_not_available"),
            Self::PaperNotReady(_) => (StatusCode::FAILED_DEPENDENCY, "paper_not_ready"),
            Self::TooManyRequests(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<AttemptError> for ApiError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Validation(message) => Self::Validation(message),
            AttemptError::ExamNotFound | AttemptError::AttemptNotFound => {
                Self::NotFound(err.to_string())
            }
            AttemptError::Forbidden => Self::Forbidden("Not allowed to access this attempt"),
            AttemptError::ExamNotAvailable(_) => Self::ExamNotAvailable(err.to_string()),
            AttemptError::AttemptClosed { state } => Self::AttemptClosed(state),
            AttemptError::AttemptsExhausted { .. } => Self::AttemptsExhausted(err.to_string()),
            AttemptError::PaperNotReady => Self::PaperNotReady(err.to_string()),
            AttemptError::Store(store) if store.is_transient() => {
                tracing::warn!(error = %store, "Attempt store unavailable");
                Self::ServiceUnavailable("Attempt store is temporarily unavailable".to_string())
            }
            AttemptError::Store(store) => Self::internal(store, "Attempt store query failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let (detail, state) = match self {
            ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::TooManyRequests(message) => (message.to_string(), None),
            ApiError::AttemptClosed(state) => (format!("Attempt is already {state}"), Some(state)),
            ApiError::Validation(message)
            | ApiError::NotFound(message)
            | ApiError::AttemptsExhausted(message)
            | ApiError::ExamNotAvailable(message)
            | ApiError::PaperNotReady(message) => (message, None),
            ApiError::ServiceUnavailable(message) | ApiError::Internal(message) => {
                tracing::error!(error = %message, code, "Request failed");
                (message, None)
            }
        };

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), code, detail, state }))
                .into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from_static("5"));
        }

        response
    }
}
