use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Unreadable image {origin}: {reason}")]
    UnreadableImage { origin: String, reason: String },

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write {}: {reason}", path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl NormalizeError {
    /// Stable machine-readable code, shared by the HTTP layer and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::UnreadableImage { .. } => "UNREADABLE_IMAGE",
            NormalizeError::InvalidConfig(_) => "INVALID_CONFIG",
            NormalizeError::WriteFailure { .. } => "WRITE_FAILURE",
            NormalizeError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            NormalizeError::MissingFile => "MISSING_FILE",
            NormalizeError::InvalidRequest(_) => "INVALID_REQUEST",
            NormalizeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for NormalizeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NormalizeError::UnreadableImage { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            NormalizeError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            NormalizeError::WriteFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NormalizeError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NormalizeError::MissingFile => StatusCode::BAD_REQUEST,
            NormalizeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            NormalizeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_message_includes_path() {
        let err = NormalizeError::WriteFailure {
            path: PathBuf::from("/nowhere/receipt_enhanced.png"),
            reason: "No such file or directory".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("/nowhere/receipt_enhanced.png"));
        assert_eq!(err.code(), "WRITE_FAILURE");
    }

    #[test]
    fn test_status_codes() {
        let unreadable = NormalizeError::UnreadableImage {
            origin: "a.png".to_string(),
            reason: "bad".to_string(),
        }
        .into_response();
        assert_eq!(unreadable.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let invalid = NormalizeError::InvalidConfig("block size".to_string()).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let too_large = NormalizeError::ImageTooLarge { size: 10, max: 5 }.into_response();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
