use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::handlers::OperationResponse;

#[derive(Error, Debug)]
pub enum FileServerError {
    #[error("Access forbidden")]
    PathEscape,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Preview not supported for this file type")]
    UnsupportedMedia,

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Archive too large: {size} bytes exceeds limit of {limit} bytes")]
    ZipTooLarge { size: u64, limit: u64 },

    #[error("Archive has too many entries: {entries} exceeds limit of {limit}")]
    ZipTooManyEntries { entries: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FileServerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FileServerError::NotFound(err.to_string()),
            std::io::ErrorKind::AlreadyExists => FileServerError::Conflict(err.to_string()),
            _ => FileServerError::Io(err),
        }
    }
}

impl From<zip::result::ZipError> for FileServerError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => FileServerError::Io(io),
            other => FileServerError::Internal(other.to_string()),
        }
    }
}

impl FileServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileServerError::PathEscape => StatusCode::FORBIDDEN,
            FileServerError::NotFound(_) => StatusCode::NOT_FOUND,
            FileServerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FileServerError::Conflict(_) => StatusCode::CONFLICT,
            FileServerError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            FileServerError::FileTooLarge { .. }
            | FileServerError::ZipTooLarge { .. }
            | FileServerError::ZipTooManyEntries { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FileServerError::Io(_) | FileServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Read endpoints answer with the status and a short plain-text body.
impl IntoResponse for FileServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Error wrapper for mutation endpoints, rendered as
/// `{"success": false, "message": ...}` with the mapped status code.
#[derive(Debug)]
pub struct JsonError(pub FileServerError);

impl From<FileServerError> for JsonError {
    fn from(err: FileServerError) -> Self {
        JsonError(err)
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        if status.is_server_error() {
            tracing::error!("Operation failed: {}", self.0);
        }

        let body = OperationResponse {
            success: false,
            message: self.0.to_string(),
            path: None,
        };

        (status, Json(body)).into_response()
    }
}
