//! Error types for the File Transfer Server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Transfer-wide result type
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors surfaced by the chunked transfer core
#[derive(Error, Debug)]
pub enum TransferError {
    /// Malformed chunk or request (missing field, bad encoding, empty name)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Internal inconsistency between a chunk and its session
    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: usize, max: usize },
}

/// Object store access failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

/// Message channel failures
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl TransferError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Channel(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Assembly(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::NotFound(_) | Self::Store(StoreError::NotFound(_)) => "not_found",
            Self::Store(StoreError::Unavailable(_)) => "storage_error",
            Self::Channel(_) => "channel_error",
            Self::Assembly(_) => "assembly_error",
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for TransferError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Transfer error: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
