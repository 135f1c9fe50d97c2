//! Error types for the usdz2glb library.
//!
//! Every failure a conversion can hit is a [`ConvertError`]. The variants
//! mirror the pipeline stages, so callers branch on [`ConvertError::kind`]
//! rather than matching on message text:
//!
//! * [`ValidationError`]: the request itself is malformed (client fault).
//!   Raised before any workspace exists, so nothing has happened yet.
//! * `Acquisition`: the source bytes could not be fetched or written.
//! * `Conversion`: an external tool exited nonzero or could not be launched.
//! * `Publication`: the store rejected or lost the upload.
//! * `Unexpected`: anything else (workspace allocation, task panics).
//!
//! All of them are terminal for the request. There is no notion of a
//! transient error here; callers that want retries wrap the whole request.

use crate::store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request is malformed or incomplete.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // ── Acquisition errors ────────────────────────────────────────────────
    /// The remote source could not be downloaded.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The source bytes could not be written into the workspace.
    #[error("Failed to stage source file '{path}': {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The declared source filename does not carry the expected extension.
    #[error("Source '{filename}' is not a .{expected} file")]
    UnsupportedSource { filename: String, expected: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// An external tool failed.
    #[error("{step} ({tool}) failed: {exit}")]
    ToolFailed {
        step: ConversionStep,
        tool: String,
        exit: ExitInfo,
    },

    // ── Publication errors ────────────────────────────────────────────────
    /// The output could not be written to the destination store.
    #[error("Failed to publish to '{bucket}/{path}': {source}")]
    PublicationFailed {
        bucket: String,
        path: String,
        #[source]
        source: StoreError,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Unexpected(String),
}

/// Coarse classification of a [`ConvertError`], one per taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Acquisition,
    Conversion,
    Publication,
    Unexpected,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Validation(_) => ErrorKind::Validation,
            ConvertError::DownloadFailed { .. }
            | ConvertError::DownloadTimeout { .. }
            | ConvertError::StagingFailed { .. }
            | ConvertError::UnsupportedSource { .. } => ErrorKind::Acquisition,
            ConvertError::ToolFailed { .. } => ErrorKind::Conversion,
            ConvertError::PublicationFailed { .. } => ErrorKind::Publication,
            ConvertError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// True when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// A request that cannot be turned into a conversion plan.
///
/// The `Display` strings are part of the HTTP contract; clients match on
/// them, so keep them stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The JSON body was empty or could not be parsed.
    #[error("No JSON data received")]
    MissingBody,

    /// One or more of the required JSON fields is absent or empty.
    #[error("Missing required fields")]
    MissingFields { fields: Vec<&'static str> },

    /// The model proxy was called without a `url` query parameter.
    #[error("URL parameter is required")]
    MissingUrlParameter,

    /// A multipart request without a `file` part.
    #[error("No file uploaded")]
    NoFile,

    /// The source filename does not end in the expected extension.
    #[error("Invalid file format")]
    InvalidFileFormat { filename: String, expected: String },

    /// The input URL is not an absolute HTTP/HTTPS URL with a file name.
    #[error("Invalid input URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The destination does not name a single, unambiguous object.
    #[error("Invalid output location '{location}': {reason}")]
    InvalidDestination { location: String, reason: String },
}

/// Which of the two external tools a conversion error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStep {
    /// USDZ archive → USD scene description.
    Unpack,
    /// USD scene description → GLB.
    Export,
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStep::Unpack => f.write_str("conversion step 1"),
            ConversionStep::Export => f.write_str("conversion step 2"),
        }
    }
}

/// How an external tool ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitInfo {
    /// The process ran and exited unsuccessfully. `code` is `None` when it
    /// was killed by a signal.
    Status { code: Option<i32>, stderr: String },
    /// The process could not be started at all.
    SpawnFailed { reason: String },
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitInfo::Status { code: Some(c), stderr } if stderr.is_empty() => {
                write!(f, "exit status {c}")
            }
            ExitInfo::Status { code: Some(c), stderr } => {
                write!(f, "exit status {c}: {}", stderr.trim_end())
            }
            ExitInfo::Status { code: None, .. } => f.write_str("terminated by signal"),
            ExitInfo::SpawnFailed { reason } => write!(f, "could not be started: {reason}"),
        }
    }
}
