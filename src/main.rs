//! Math OCR - HTTP service that transcribes images of handwritten or printed
//! math into LaTeX via a hosted multimodal model, logging every extraction.

mod config;
mod error;
mod extractor;
mod store;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use config::Config;
use error::ApiError;
use extractor::{FormulaExtractor, OpenRouterClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::OcrStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: OcrStore,
    extractor: Arc<dyn FormulaExtractor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "math_ocr=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Open the results database once; handlers share the connection.
    let store = OcrStore::open(&config.db_path)?;
    info!("OCR store opened at {}", config.db_path);

    let client = OpenRouterClient::new(&config.api_key, &config.model);
    info!("Extraction client initialized: model={}", config.model);

    let state = AppState {
        store,
        extractor: Arc::new(client),
    };

    // Build router
    let app = Router::new()
        .route("/ocr", post(ocr))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OcrRequest {
    /// Base64-encoded image of the expression.
    image: String,
}

#[derive(Debug, Serialize)]
struct OcrResponse {
    latex: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Transcribe one image into LaTeX and log the result.
///
/// The record is inserted only after extraction fully succeeds, so a failed
/// model call never leaves a half-written row behind.
async fn ocr(
    State(state): State<AppState>,
    Json(request): Json<OcrRequest>,
) -> Result<Json<OcrResponse>, ApiError> {
    if request.image.is_empty() {
        return Err(ApiError::InvalidInput(
            "image must be a non-empty base64 string".to_string(),
        ));
    }

    let image_bytes = BASE64.decode(&request.image).map_err(|e| {
        error!("Rejected request with malformed base64: {}", e);
        ApiError::InvalidInput("Invalid base64 image encoding".to_string())
    })?;

    info!("Received image ({} bytes decoded)", image_bytes.len());

    let latex = state
        .extractor
        .extract_formula(&image_bytes)
        .await
        .map_err(|e| {
            error!("Extraction failed: {}", e);
            ApiError::Extraction(e)
        })?;

    let id = state
        .store
        .insert(&request.image, &latex)
        .map_err(|e| {
            error!("Failed to store OCR record: {}", e);
            ApiError::Storage(e)
        })?;

    info!("Extraction complete: record id={}", id);
    Ok(Json(OcrResponse { latex }))
}

/// Report whether the results database is readable. Never errors at the
/// HTTP level; failures surface in the status field instead.
async fn health(State(state): State<AppState>) -> Json<Health> {
    let health = match state.store.count() {
        Ok(_) => Health {
            status: "healthy",
            database: "connected".to_string(),
        },
        Err(e) => Health {
            status: "unhealthy",
            database: e.to_string(),
        },
    };
    Json(health)
}
