//! Conversion requests and their validation.
//!
//! A [`ConversionRequest`] is what a caller hands in; a [`ConversionPlan`] is
//! what the pipeline actually executes. [`ConversionRequest::into_plan`] is
//! the only way from one to the other and it is a pure function: it touches
//! neither the filesystem nor the network, so a rejected request has no side
//! effects at all.

use crate::config::ConverterConfig;
use crate::error::{ConvertError, ValidationError};
use crate::store::{bucket_problem, key_problem};
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::fmt;
use std::path::Path;

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static regex"));

/// Where the source asset comes from.
#[derive(Clone)]
pub enum SourceSpec {
    /// Fetch the asset from an HTTP/HTTPS URL (signed URLs welcome; the query
    /// string is ignored when naming the local file).
    Remote { url: String },
    /// The asset was already received, e.g. as a multipart upload.
    Inline { filename: String, bytes: Bytes },
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Remote { url } => f
                .debug_struct("Remote")
                .field("url", &redact_query(url))
                .finish(),
            SourceSpec::Inline { filename, bytes } => f
                .debug_struct("Inline")
                .field("filename", filename)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// A single object in a durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    pub path: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// Check that this names exactly one object and return its file name.
    fn validate(&self) -> Result<&str, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidDestination {
            location: format!("{}/{}", self.bucket, self.path),
            reason: reason.to_string(),
        };

        if let Some(reason) = bucket_problem(&self.bucket).or_else(|| key_problem(&self.path)) {
            return Err(invalid(reason));
        }

        // Non-empty and not ending in '/', so there is a last segment.
        Ok(self.path.rsplit('/').next().unwrap_or(&self.path))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.path)
    }
}

/// An immutable request to convert one asset.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: SourceSpec,
    pub destination: Destination,
}

impl ConversionRequest {
    /// Remote-fetch request, as sent by the JSON entry point.
    pub fn remote(
        url: impl Into<String>,
        bucket: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            source: SourceSpec::Remote { url: url.into() },
            destination: Destination::new(bucket, path),
        }
    }

    /// Inline-upload request with an explicit destination.
    pub fn inline(filename: impl Into<String>, bytes: Bytes, destination: Destination) -> Self {
        Self {
            source: SourceSpec::Inline {
                filename: filename.into(),
                bytes,
            },
            destination,
        }
    }

    /// Inline-upload request whose destination is derived from the config:
    /// `<upload_bucket>/<upload_prefix>/<uuid>/<stem>.<output_extension>`.
    ///
    /// The filename is checked before the bucket so that a bad upload is
    /// reported as the client's fault even on a misconfigured server.
    pub fn upload(
        filename: impl Into<String>,
        bytes: Bytes,
        config: &ConverterConfig,
    ) -> Result<Self, ConvertError> {
        let filename = filename.into();
        let safe = sanitise_filename(&filename);
        check_extension(&safe, &config.input_extension)?;

        let bucket = config.upload_bucket.clone().ok_or_else(|| {
            ConvertError::Unexpected("upload bucket is not configured".to_string())
        })?;

        let stem = Path::new(&safe)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let object = format!("{stem}.{}", config.output_extension);
        let id = uuid::Uuid::new_v4();
        let path = if config.upload_prefix.is_empty() {
            format!("{id}/{object}")
        } else {
            format!("{}/{id}/{object}", config.upload_prefix)
        };

        Ok(Self::inline(filename, bytes, Destination::new(bucket, path)))
    }

    /// Validate the request against `config` and derive every name the
    /// pipeline needs.
    pub fn into_plan(self, config: &ConverterConfig) -> Result<ConversionPlan, ValidationError> {
        let output_filename = self.destination.validate()?.to_string();

        let source = match self.source {
            SourceSpec::Remote { url } => {
                let (parsed, filename) = parse_source_url(&url)?;
                check_extension(&filename, &config.input_extension)?;
                PlannedSource::Remote {
                    url: parsed,
                    filename,
                }
            }
            SourceSpec::Inline { filename, bytes } => {
                let filename = sanitise_filename(&filename);
                check_extension(&filename, &config.input_extension)?;
                PlannedSource::Inline { filename, bytes }
            }
        };

        Ok(ConversionPlan {
            source,
            destination: self.destination,
            output_filename,
        })
    }
}

/// A validated request, ready to execute.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    pub source: PlannedSource,
    pub destination: Destination,
    /// File name the export step writes inside the workspace.
    pub output_filename: String,
}

/// A validated source with its workspace-safe file name.
#[derive(Clone)]
pub enum PlannedSource {
    Remote { url: Url, filename: String },
    Inline { filename: String, bytes: Bytes },
}

impl PlannedSource {
    pub fn filename(&self) -> &str {
        match self {
            PlannedSource::Remote { filename, .. } | PlannedSource::Inline { filename, .. } => {
                filename
            }
        }
    }
}

impl fmt::Debug for PlannedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedSource::Remote { url, filename } => f
                .debug_struct("Remote")
                .field("url", &redact_query(url.as_str()))
                .field("filename", filename)
                .finish(),
            PlannedSource::Inline { filename, bytes } => f
                .debug_struct("Inline")
                .field("filename", filename)
                .field("len", &bytes.len())
                .finish(),
        }
    }
}

/// The JSON body of the remote-fetch entry point:
/// `{ "inputUrl": …, "outputBucket": …, "outputPath": … }`.
///
/// Parsing is deliberately loose (any JSON object) so that absent, `null`,
/// non-string and empty fields all surface as the same
/// [`ValidationError::MissingFields`].
pub fn parse_remote_payload(body: &[u8]) -> Result<ConversionRequest, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::MissingBody);
    }
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::MissingBody)?;
    let object = value.as_object().ok_or(ValidationError::MissingBody)?;

    let field = |name: &str| {
        object
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let mut missing = Vec::new();
    let mut take = |name: &'static str| {
        let v = field(name);
        if v.is_none() {
            missing.push(name);
        }
        v.unwrap_or_default().to_string()
    };
    let url = take("inputUrl");
    let bucket = take("outputBucket");
    let path = take("outputPath");

    if !missing.is_empty() {
        return Err(ValidationError::MissingFields { fields: missing });
    }
    Ok(ConversionRequest::remote(url, bucket, path))
}

/// Parse an absolute HTTP(S) URL. Rejections never echo the query string.
pub fn parse_http_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw.trim()).map_err(|e| invalid_url(raw, &e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid_url(raw, "only http and https URLs are supported"));
    }
    Ok(url)
}

/// Parse a source URL and derive the local file name from its last path
/// segment. The query string and fragment never contribute to the name.
fn parse_source_url(raw: &str) -> Result<(Url, String), ValidationError> {
    let url = parse_http_url(raw)?;
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_url(raw, "URL path does not name a file"))?;

    let filename = sanitise_filename(last);
    Ok((url, filename))
}

fn invalid_url(raw: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidUrl {
        url: redact_query(raw.trim()),
        reason: reason.to_string(),
    }
}

/// Signed URLs carry credentials in the query string; keep them out of logs
/// and error messages. Works on unparseable input too.
pub(crate) fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?redacted"),
        None => url.to_string(),
    }
}

/// Replace every character that is not safe in a bare file name.
pub(crate) fn sanitise_filename(name: &str) -> String {
    // Uploaded names may carry client-side directories ("C:\\models\\a.usdz").
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    UNSAFE_FILENAME_CHARS.replace_all(base, "_").into_owned()
}

pub(crate) fn has_extension(filename: &str, expected: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(expected))
}

fn check_extension(filename: &str, expected: &str) -> Result<(), ValidationError> {
    if has_extension(filename, expected) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFileFormat {
            filename: filename.to_string(),
            expected: expected.to_string(),
        })
    }
}
