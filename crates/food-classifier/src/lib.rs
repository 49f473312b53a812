//! Food Image Classifier
//!
//! Runs a pretrained ONNX image-classification model with tract and turns
//! its logits into ranked, human-readable food predictions.

mod backend;
mod engine;
mod labels;
mod preprocess;
mod ranking;

pub use backend::{Device, DevicePreference, InputTensor, ModelBackend, OnnxBackend};
pub use engine::FoodClassifier;
pub use labels::LabelTable;
pub use preprocess::{decode_image, PreprocessorConfig, Resample};
pub use ranking::{
    annotate_label, rank, round_confidence, softmax, top_k, Prediction, BEVERAGE_KEYWORDS,
    LOW_CONFIDENCE_THRESHOLD,
};

use thiserror::Error;

/// Default number of predictions returned per request
pub const DEFAULT_TOP_K: usize = 5;

/// Errors raised while loading a model or classifying an image
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Image decode failed: {0}")]
    ImageDecode(String),
    #[error("Preprocessing failed: {0}")]
    Preprocess(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("top_k must be between 1 and {max}, got {requested}")]
    InvalidTopK { requested: usize, max: usize },
}

/// Classification service shared by request handlers.
///
/// Implementations must be read-only after construction: the HTTP layer
/// calls `classify` concurrently from several blocking threads.
pub trait ImageClassifier: Send + Sync {
    /// Classify encoded image bytes, returning `top_k` predictions sorted by
    /// descending confidence.
    fn classify(&self, image_bytes: &[u8], top_k: usize) -> Result<Vec<Prediction>, ClassifierError>;

    /// Identifier of the loaded model
    fn model_id(&self) -> &str;

    /// Number of classes the model scores
    fn num_classes(&self) -> usize;

    /// Device the forward pass runs on
    fn device(&self) -> Device;
}
