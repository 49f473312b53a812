//! Food Vision API Server
//!
//! REST API exposing the food image classifier.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use food_classifier::ImageClassifier;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Subscriber};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter, FmtSubscriber};

pub mod error;
pub mod routes;
pub mod settings;
pub mod validation;

pub use error::ApiError;
pub use settings::{cors_layer, AppConfig, ConfigError};

/// Room for multipart boundaries and headers on top of the file limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across handlers
pub struct AppState {
    /// Loaded classifier, read-only
    pub classifier: Arc<dyn ImageClassifier>,
    /// Upload limits
    pub upload: settings::UploadConfig,
    /// Predictions returned when the request does not ask for a count
    pub default_top_k: usize,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(classifier: Arc<dyn ImageClassifier>, config: &AppConfig) -> Self {
        Self {
            classifier,
            upload: config.upload.clone(),
            default_top_k: config.model.top_k,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    let body_limit = state.upload.max_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/predict", post(routes::predict::predict))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging; `RUST_LOG` overrides the level picked by `debug`
pub fn init_logging(debug: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(log_subscriber(debug, std::io::stdout))
}

/// Human-readable lines in debug mode, JSON lines otherwise
fn log_subscriber<W>(debug: bool, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(writer);

    if debug {
        Box::new(builder.finish())
    } else {
        Box::new(builder.json().finish())
    }
}

/// Run the server until ctrl-c
pub async fn run_server(
    config: &AppConfig,
    classifier: Arc<dyn ImageClassifier>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(classifier, config));
    let app = create_router(state, cors_layer(&config.server.cors_origins)?);

    let addr = config.bind_addr();
    info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
