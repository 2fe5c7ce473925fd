use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;

/// Custom error types for the wiki application
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Item not found")]
    NotFound,
    #[error("Parent not found")]
    ParentNotFound,
    #[error("Items not found")]
    ItemsNotFound,
    #[error("Invalid path")]
    InvalidPath,
    #[error("{0}")]
    Validation(String),
    #[error("Failed to parse page metadata: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WikiError {
    pub fn status(&self) -> StatusCode {
        match self {
            WikiError::NotFound | WikiError::ParentNotFound | WikiError::ItemsNotFound => {
                StatusCode::NOT_FOUND
            }
            WikiError::InvalidPath | WikiError::Validation(_) => StatusCode::BAD_REQUEST,
            WikiError::Unauthorized => StatusCode::UNAUTHORIZED,
            WikiError::Forbidden(_) => StatusCode::FORBIDDEN,
            WikiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            WikiError::Io(_) | WikiError::Parse(_) | WikiError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WikiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
