pub mod health;
pub mod jobs;
pub mod logs;
pub mod metrics;

// Common response envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::errors::{ConfigurationError, SchedulerError, StorageError};
use serde::Serialize;

/// Every payload is wrapped in `{code, message, data}`; success carries
/// code 200, any failure code 500 with a human-readable message.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Failure envelope. All failures are code 500 in the body and HTTP 500 on
/// the wire; validation failures name the offending field in the message.
#[derive(Debug)]
pub struct ApiError {
    pub message: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::new(format!("{} {} not found", what, id))
    }

    pub fn validation(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(format!("invalid field {}: {}", field, reason))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": 500,
            "message": self.message,
            "data": null,
        });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::new(err.to_string())
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        ApiError::new(err.to_string())
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> Self {
        ApiError::new(err.to_string())
    }
}
