use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::archival::ArchiveError;
use crate::services::attempt_lifecycle::LifecycleError;
use crate::services::attempt_versions::VersionStoreError;
use crate::services::attempt_workflow::WorkflowError;
use crate::services::identity::IdentityError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
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

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized(message) => {
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message) | ApiError::TooManyRequests(message) => {
                message.to_string()
            }
            ApiError::BadRequest(message)
            | ApiError::NotFound(message)
            | ApiError::Conflict(message) => message,
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                message
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                message
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken => {
                ApiError::Unauthorized("Invalid authentication credentials")
            }
            IdentityError::InvalidQuery => {
                ApiError::BadRequest("student_id must be a valid UUID".to_string())
            }
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::StorageUnavailable => ApiError::ServiceUnavailable(
                "Archival storage is not configured; attempts cannot be completed".to_string(),
            ),
            other => ApiError::internal(other, "Failed to archive attempt snapshot"),
        }
    }
}

impl From<VersionStoreError> for ApiError {
    fn from(err: VersionStoreError) -> Self {
        match err {
            VersionStoreError::AttemptNotFound(_) => {
                ApiError::NotFound("Attempt not found".to_string())
            }
            VersionStoreError::AttemptCompleted(_) => {
                ApiError::Conflict("Attempt is already completed".to_string())
            }
            VersionStoreError::UnknownQuestion { question_id, .. } => {
                ApiError::NotFound(format!("Question {question_id} is not part of this attempt"))
            }
            other => ApiError::internal(other, "Failed to access attempt snapshot"),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AttemptNotFound(_) => {
                ApiError::NotFound("Attempt not found".to_string())
            }
            LifecycleError::AlreadyCompleted(_) => {
                ApiError::Conflict("Attempt is already completed".to_string())
            }
            LifecycleError::OpenConflict { .. } => {
                ApiError::Conflict("Another attempt was opened concurrently; retry".to_string())
            }
            LifecycleError::Snapshot(err) => err.into(),
            LifecycleError::Archive(err) => err.into(),
            other => ApiError::internal(other, "Failed to update attempt"),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::TestNotFound(_) => ApiError::NotFound("Test not found".to_string()),
            WorkflowError::AttemptNotFound(_) => {
                ApiError::NotFound("Attempt not found".to_string())
            }
            WorkflowError::NotOwner(_) => {
                ApiError::Forbidden("Attempt belongs to another student")
            }
            WorkflowError::AlreadyCompleted(_) => {
                ApiError::Conflict("Attempt is already completed".to_string())
            }
            WorkflowError::NotCompleted(_) => {
                ApiError::Conflict("Attempt is not completed yet".to_string())
            }
            WorkflowError::Lifecycle(err) => err.into(),
            WorkflowError::Snapshot(err) => err.into(),
            WorkflowError::Database(err) => ApiError::internal(err, "Database error"),
        }
    }
}
