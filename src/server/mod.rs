//! HTTP surface for the conversion service.
//!
//! | Route | Body | Success |
//! |-------|------|---------|
//! | `POST /convert` | JSON `inputUrl`/`outputBucket`/`outputPath` | `{"message":"Conversion successful","outputPath":…}` |
//! | `POST /api/convert/usdz-to-glb` | multipart, part `file` | `{"success":true,"output_url":…}` |
//! | `GET /api/model?url=…` | none | upstream body, streamed, with its `Content-Type` |
//! | `GET /health` | none | `{"status":"healthy"}` |
//!
//! Every route answers CORS requests from any origin. Failures are mapped by
//! [`ApiError`].

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{ModelQuery, UPLOAD_FIELD};

use crate::convert::ConversionService;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: ConversionService,
}

impl AppState {
    pub fn new(service: ConversionService) -> Self {
        Self { service }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.service.config().max_upload_bytes;

    Router::new()
        .route("/convert", post(handlers::convert_remote))
        .route("/api/convert/usdz-to-glb", post(handlers::convert_upload))
        .route("/api/model", get(handlers::proxy_model))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
