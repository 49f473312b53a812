//! Food Vision API - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use food_classifier::{FoodClassifier, ImageClassifier};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_logging(config.server.debug)?;

    info!("=== Food Vision AI API v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Model: {}", config.model.id);

    let classifier = FoodClassifier::load(&config.model.id, &config.model.root, config.model.device)
        .map_err(|e| {
            error!("Error loading model: {}", e);
            e
        })?;

    info!(
        "Model ready: {} classes on {}",
        classifier.num_classes(),
        classifier.device()
    );

    run_server(&config, Arc::new(classifier)).await
}
