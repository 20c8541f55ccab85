//! API handlers

pub mod campaigns;
pub mod channels;
pub mod contacts;
pub mod drips;
pub mod health;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

/// Shorthand for the (status, body) error tuple handlers return
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn forbidden(status: StatusCode) -> ApiError {
    (
        status,
        Json(ErrorResponse::new(
            "forbidden",
            "Not authorized for this organization",
        )),
    )
}

pub(crate) fn internal(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", message)),
    )
}

pub(crate) fn not_found(message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not_found", message)),
    )
}

pub(crate) fn validation(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("validation_error", message)),
    )
}
