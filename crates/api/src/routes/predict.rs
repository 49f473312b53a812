//! Prediction Route

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        Multipart, Query, State,
    },
    Json,
};
use food_classifier::Prediction;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::validation::{validate_upload, Upload};
use crate::AppState;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

const SUCCESS_MESSAGE: &str = "Food classification completed successfully";

/// Query parameters for the predict endpoint
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    /// Number of predictions to return
    pub top_k: Option<usize>,
}

/// Successful prediction response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predictions: Vec<Prediction>,
    pub message: String,
}

/// Classify an uploaded image
pub async fn predict(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let result = classify_upload(&state, query, multipart).await;

    match &result {
        Ok(_) => metrics::counter!("food_vision_predictions_total").increment(1),
        Err(e) => metrics::counter!(
            "food_vision_prediction_errors_total",
            "status" => e.status().as_u16().to_string()
        )
        .increment(1),
    }

    result.map(Json)
}

async fn classify_upload(
    state: &Arc<AppState>,
    query: Result<Query<PredictQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictResponse, ApiError> {
    let Query(params) = query.map_err(|_| ApiError::BadRequest)?;

    // a body that is not multipart carries no files
    let upload = match multipart {
        Ok(mut multipart) => read_image_field(&mut multipart, state.upload.max_bytes).await?,
        Err(rejection) => {
            debug!("Request is not multipart: {}", rejection);
            None
        }
    };

    let upload = validate_upload(upload, &state.upload)?;

    let max = state.classifier.num_classes();
    let top_k = params.top_k.unwrap_or(state.default_top_k);
    if top_k == 0 || top_k > max {
        return Err(ApiError::InvalidTopK { max });
    }

    let classifier = Arc::clone(&state.classifier);
    let filename = upload.filename;
    let data = upload.data;

    let predictions = tokio::task::spawn_blocking(move || classifier.classify(&data, top_k))
        .await
        .map_err(|e| ApiError::Prediction(e.to_string()))??;

    info!(
        "Classified {}: {:?}",
        filename,
        predictions.first().map(|p| (&p.class_name, p.confidence))
    );

    Ok(PredictResponse {
        success: true,
        predictions,
        message: SUCCESS_MESSAGE.to_string(),
    })
}

/// Read the first file field named `image`.
///
/// Bytes past `max_bytes` are counted but not buffered.
async fn read_image_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<Option<Upload>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, max_bytes))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        // plain form values are not files
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };

        let mut upload = Upload {
            filename,
            ..Default::default()
        };
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::from_multipart(e, max_bytes))?
        {
            upload.size += chunk.len();
            if upload.size <= max_bytes {
                upload.data.extend_from_slice(&chunk);
            }
        }

        return Ok(Some(upload));
    }

    Ok(None)
}
