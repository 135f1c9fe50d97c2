//! Mapping pipeline failures onto HTTP responses.
//!
//! Status codes follow the error taxonomy: validation errors are the
//! client's fault (400), everything else is ours (500). The body always
//! carries the human-readable cause under `error`, and the failing stage
//! under `stage` when one is known.

use crate::error::{ConvertError, ValidationError};
use crate::outcome::{PipelineFailure, Stage};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error type for the conversion handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request went through (part of) the pipeline and failed.
    #[error(transparent)]
    Failure(#[from] PipelineFailure),

    /// A server-side problem not attributable to a pipeline stage.
    #[error(transparent)]
    Internal(ConvertError),

    /// The model proxy could not reach the upstream host. Details stay in
    /// the log; the client only learns that the fetch failed.
    #[error("model proxy failed: {0}")]
    Proxy(ConvertError),

    /// The multipart body itself could not be read.
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Failure(PipelineFailure::new(Stage::Validation, e))
    }
}

impl From<ConvertError> for ApiError {
    fn from(e: ConvertError) -> Self {
        if e.is_client_error() {
            ApiError::Failure(PipelineFailure::new(Stage::Validation, e))
        } else {
            ApiError::Internal(e)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Failure(failure) => {
                let status = if failure.error.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let mut body = json!({
                    "error": failure.error.to_string(),
                    "stage": failure.stage,
                });
                if let ConvertError::Validation(ValidationError::MissingFields { fields }) =
                    &failure.error
                {
                    body["missing"] = json!(fields);
                }
                (status, body)
            }
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            ),
            ApiError::Proxy(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to fetch model" }),
            ),
            ApiError::Multipart(e) => (
                e.status(),
                json!({ "error": e.body_text(), "stage": Stage::Validation }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
