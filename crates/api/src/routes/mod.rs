//! HTTP routes

pub mod health;
pub mod predict;

use crate::error::ApiError;

/// Fallback for unknown paths
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
