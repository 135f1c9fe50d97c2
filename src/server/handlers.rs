//! Route handlers.
//!
//! Both conversion routes hand the request to the shared
//! [`ConversionService`](crate::ConversionService) on a freshly spawned task.
//! If the client hangs up, axum drops the handler future but the spawned
//! pipeline keeps running to its terminal state, so the workspace is always
//! torn down through the normal path.
//!
//! `GET /api/model` is a plain streaming proxy and never touches the
//! pipeline.

use super::error::ApiError;
use super::AppState;
use crate::error::{ConvertError, ValidationError};
use crate::outcome::Published;
use crate::request::{parse_http_url, parse_remote_payload, redact_query, ConversionRequest};
use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Name of the multipart part that carries the archive.
pub const UPLOAD_FIELD: &str = "file";

/// `POST /convert`
///
/// Body: `{"inputUrl": …, "outputBucket": …, "outputPath": …}`.
pub async fn convert_remote(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request = parse_remote_payload(&body)?;
    let published = run_detached(&state, request).await?;

    Ok(Json(json!({
        "message": "Conversion successful",
        "outputPath": published.path,
    })))
}

/// `POST /api/convert/usdz-to-glb`
///
/// Multipart body with the archive in the `file` part. Other parts are
/// ignored.
pub async fn convert_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        debug!("Received upload '{}' ({} bytes)", filename, bytes.len());
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or(ValidationError::NoFile)?;
    let request = ConversionRequest::upload(filename, bytes, state.service.config())?;
    let published = run_detached(&state, request).await?;

    Ok(Json(json!({
        "success": true,
        "output_url": published.url,
    })))
}

/// Query string of `GET /api/model`.
#[derive(Debug, Deserialize)]
pub struct ModelQuery {
    url: Option<String>,
}

/// `GET /api/model?url=…`
///
/// Streams a remote model back to the caller so a browser can load assets
/// from hosts that send no CORS headers. The upstream `Content-Type` is
/// forwarded and the body is never buffered.
pub async fn proxy_model(
    State(state): State<AppState>,
    Query(query): Query<ModelQuery>,
) -> Result<Response, ApiError> {
    let raw = query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(ValidationError::MissingUrlParameter)?;
    let url = parse_http_url(&raw)?;
    info!("Proxying model from: {}", redact_query(url.as_str()));

    let upstream = state.service.fetcher().get(&url).await.map_err(|e| {
        warn!("Model proxy failed: {}", e);
        ApiError::Proxy(e)
    })?;

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response())
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn run_detached(state: &AppState, request: ConversionRequest) -> Result<Published, ApiError> {
    let service = state.service.clone();
    let outcome = tokio::spawn(async move { service.convert(request).await })
        .await
        .map_err(|e| {
            error!("Conversion task failed: {}", e);
            ConvertError::Unexpected("conversion task failed".to_string())
        })?;
    Ok(outcome.into_result()?)
}
