//! API error responses

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use food_classifier::ClassifierError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::validation::UploadError;

/// Errors returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Bad request")]
    BadRequest,
    #[error("top_k must be between 1 and {max}")]
    InvalidTopK { max: usize },
    #[error("An error occurred during prediction")]
    Prediction(String),
    #[error("Not found")]
    NotFound,
}

impl ApiError {
    /// Map a multipart read failure; body-limit overruns become 413
    pub fn from_multipart(err: MultipartError, max_bytes: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge {
                max_mb: crate::validation::limit_in_mb(max_bytes),
            }
            .into()
        } else {
            warn!("Malformed multipart body: {}", err);
            ApiError::BadRequest
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(_) | ApiError::BadRequest | ApiError::InvalidTopK { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::InvalidTopK { max, .. } => ApiError::InvalidTopK { max },
            other => ApiError::Prediction(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Prediction(details) => {
                error!("Error in prediction: {}", details);
                json!({ "error": self.to_string(), "details": details })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
