use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid JSON")]
    MalformedPayload,

    #[error("messages[] required")]
    EmptyMessages,

    #[error("email and password (8+ chars) required")]
    InvalidCredentials,

    #[error("Invalid email or password")]
    BadCredentials,

    #[error("Missing or invalid session")]
    Unauthorized,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Database(#[from] redis::RedisError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AppError::MalformedPayload | AppError::EmptyMessages | AppError::InvalidCredentials => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            AppError::BadCredentials | AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AppError::DuplicateEmail => (StatusCode::CONFLICT, "conflict"),
            AppError::Database { .. } | AppError::InternalError { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        };

        (status, Json(json!({ "error": code, "note": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::header::CONTENT_TYPE};
    use serde_json::Value;

    use super::*;

    async fn parts_of(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(
            content_type.contains("application/json"),
            "error body must be JSON, got {content_type:?}"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn empty_messages_is_rejected_with_400_json() {
        let (status, body) = parts_of(AppError::EmptyMessages).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["note"], "messages[] required");
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_with_400_json() {
        let (status, body) = parts_of(AppError::MalformedPayload).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["note"], "Invalid JSON");
    }

    #[tokio::test]
    async fn auth_failures_map_to_401() {
        let (status, body) = parts_of(AppError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = parts_of(AppError::BadCredentials).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_email_maps_to_409() {
        let (status, body) = parts_of(AppError::DuplicateEmail).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }
}
