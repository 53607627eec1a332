//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use palaver_types::error::ChatError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine errors.
    Chat(ChatError),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    /// Status, machine-readable code, message, and optional details.
    fn parts(&self) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
        let message = self.to_string();
        match self {
            AppError::Chat(ChatError::LimitExceeded {
                limit_type,
                max_usage,
                current_usage,
                reset_date,
            }) => (
                StatusCode::TOO_MANY_REQUESTS,
                "LIMIT_EXCEEDED",
                message,
                Some(json!({
                    "limit_type": limit_type,
                    "max_usage": max_usage,
                    "current_usage": current_usage,
                    "reset_date": reset_date,
                })),
            ),
            AppError::Chat(ChatError::Busy(_)) => (StatusCode::CONFLICT, "CHAT_BUSY", message, None),
            AppError::Chat(ChatError::ProviderStream(_)) => {
                (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", message, None)
            }
            AppError::Chat(ChatError::UnknownBot(_)) => {
                (StatusCode::NOT_FOUND, "BOT_NOT_FOUND", message, None)
            }
            AppError::Chat(ChatError::InvalidSession(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_SESSION", message, None)
            }
            AppError::Chat(ChatError::Persistence(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                message,
                None,
            ),
            AppError::Chat(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CHAT_ERROR", message, None),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message, None),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                message,
                None,
            ),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Chat(e) => write!(f, "{e}"),
            AppError::NotFound(msg) | AppError::Validation(msg) | AppError::Internal(msg) => {
                f.write_str(msg)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();
        if status.is_server_error() {
            tracing::warn!(code, %message, "request failed");
        }

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
