use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use visualfoundry_core::{RenderError, StorageError, UploadError};

pub const IMAGE_REQUIRED: &str = "Image is required";
pub const FILE_TOO_LARGE: &str = "File too large";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<String>,
    },
    #[error("Render failed")]
    Render(#[from] RenderError),
    #[error("Unable to stream render")]
    Stream(#[source] std::io::Error),
    #[error("Unexpected error")]
    Unexpected(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Render(_) | ApiError::Stream(_) | ApiError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Validation { details, .. } => details.clone(),
            ApiError::Render(error) => Some(error.details()),
            ApiError::Stream(error) => Some(error.to_string()),
            ApiError::Unexpected(details) => Some(details.clone()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(error: UploadError) -> Self {
        ApiError::Validation {
            message: IMAGE_REQUIRED.to_string(),
            details: match error {
                UploadError::Missing => None,
                other => Some(other.to_string()),
            },
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        ApiError::Unexpected(error.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %body.error, details = ?body.details, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %body.error, "request rejected");
        }
        (status, Json(body)).into_response()
    }
}
