// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the storage layer and the ingestion pipeline.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors raised by an `ObjectStore` backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A conditional write lost: the object exists, or changed since it was read.
    #[error("Precondition failed for {0}")]
    PreconditionFailed(String),

    #[error("Failed to read {path}: {reason}")]
    ReadFailure { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailure { path: String, reason: String },

    #[error("Unsupported storage operation: {0}")]
    Unsupported(String),
}

impl StorageError {
    pub fn read(path: &str, reason: impl ToString) -> Self {
        StorageError::ReadFailure {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(path: &str, reason: impl ToString) -> Self {
        StorageError::WriteFailure {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed input file. Fatal for the invocation, nothing is persisted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Archive or promote write failed. Already-durable archive copies stay in place.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Another writer promoted the lineage concurrently.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => AppError::NotFound(path),
            StorageError::PreconditionFailed(path) => {
                AppError::Conflict(format!("{} was modified concurrently", path))
            }
            StorageError::ReadFailure { .. } => AppError::Internal(anyhow::Error::new(err)),
            StorageError::WriteFailure { .. } | StorageError::Unsupported(_) => {
                AppError::WriteFailure(err.to_string())
            }
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Parse(msg) => (StatusCode::BAD_REQUEST, "parse_error", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Notify(msg) => {
                tracing::error!(error = %msg, "Notification error");
                (StatusCode::BAD_GATEWAY, "notify_error", None)
            }
            AppError::WriteFailure(msg) => {
                tracing::error!(error = %msg, "Storage write failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "write_failure", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
