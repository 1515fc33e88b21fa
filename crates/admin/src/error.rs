//! Unified error handling for the HTTP surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::repository::UpdateError;
use crate::storage::{QueueError, StorageError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Table storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Queue operation failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Every update strategy failed.
    #[error("Update failed: {0}")]
    UpdateFailed(#[from] UpdateError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or wrong API key.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Storage(StorageError::NotFound) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(StorageError::Conflict) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Queue(_) => StatusCode::BAD_GATEWAY,
            Self::UpdateFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Update failures echo the full attempt chain; this is an operator tool.
        let body = match &self {
            Self::Internal(_) => json!({ "error": "Internal server error" }),
            Self::UpdateFailed(UpdateError::Exhausted { attempts, .. }) => json!({
                "error": self.to_string(),
                "attempts": attempts,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repository::{Attempt, UpdateStrategy};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("customer c-123".to_string());
        assert_eq!(err.to_string(), "Not found: customer c-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Storage(StorageError::Conflict)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Storage(StorageError::Unavailable("down".into()))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Queue(QueueError::NotConfigured)),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response = AppError::Internal("secret stack".into()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_update_failure_echoes_attempts() {
        let err = AppError::UpdateFailed(UpdateError::Exhausted {
            kind: "customer",
            id: "c-1".into(),
            attempts: vec![Attempt {
                strategy: UpdateStrategy::ConditionalMerge,
                error: "version tag mismatch".into(),
            }],
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["attempts"][0]["strategy"], "conditional_merge");
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .contains("conditional merge failed: version tag mismatch")
        );
    }
}
