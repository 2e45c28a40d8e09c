// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Domain errors raised by the stores and the quiz service.
///
/// Per-response outcomes (`invalid_question`, `invalid_letter`, `already_answered`)
/// are never raised through this type; they travel inline in the result list.
#[derive(Debug, Error)]
pub enum QuizError {
    #[error("quiz not found")]
    QuizNotFound,

    #[error("invalid username")]
    InvalidUsername,

    #[error("invalid question")]
    InvalidQuestion,

    #[error("invalid answer letter")]
    InvalidLetter,

    #[error("quiz id is required")]
    MissingQuizId,

    #[error("question fetcher is not configured")]
    FetcherUnavailable,

    #[error("question provider failed: {0}")]
    Provider(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QuizResult<T> = Result<T, QuizError>;

impl From<reqwest::Error> for QuizError {
    fn from(err: reqwest::Error) -> Self {
        QuizError::Provider(err.to_string())
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 404 Not Found
    NotFound(String),

    // 502 Bad Gateway (question provider unreachable)
    BadGateway(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "request failed".to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "failed to fetch questions".to_string())
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Maps domain errors onto HTTP status codes.
impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        match err {
            QuizError::QuizNotFound => AppError::NotFound("quiz not found".to_string()),
            QuizError::InvalidUsername => AppError::BadRequest(
                "username is required to link responses to leaderboard".to_string(),
            ),
            QuizError::InvalidQuestion | QuizError::InvalidLetter | QuizError::MissingQuizId => {
                AppError::BadRequest(err.to_string())
            }
            QuizError::FetcherUnavailable | QuizError::Provider(_) => {
                AppError::BadGateway(err.to_string())
            }
            QuizError::Storage(_) | QuizError::Serialization(_) => {
                AppError::InternalServerError(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
