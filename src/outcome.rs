//! The terminal result of one conversion.
//!
//! Every request produces exactly one [`ConversionOutcome`]: either the
//! published object or the stage that failed plus its cause.

use crate::error::{ConversionStep, ConvertError, ErrorKind};
use serde::Serialize;
use std::fmt;

/// The pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    #[serde(rename = "validation")]
    Validation,
    #[serde(rename = "workspace")]
    Workspace,
    #[serde(rename = "acquisition")]
    Acquisition,
    #[serde(rename = "conversion-step-1")]
    ConversionStep1,
    #[serde(rename = "conversion-step-2")]
    ConversionStep2,
    #[serde(rename = "publication")]
    Publication,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Workspace => "workspace",
            Stage::Acquisition => "acquisition",
            Stage::ConversionStep1 => "conversion-step-1",
            Stage::ConversionStep2 => "conversion-step-2",
            Stage::Publication => "publication",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConversionStep> for Stage {
    fn from(step: ConversionStep) -> Self {
        match step {
            ConversionStep::Unpack => Stage::ConversionStep1,
            ConversionStep::Export => Stage::ConversionStep2,
        }
    }
}

/// A successfully published GLB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub bucket: String,
    pub path: String,
    /// Store-specific locator, e.g. `gs://bucket/path` or `file:///…`.
    pub url: String,
    pub size_bytes: u64,
}

/// A failed conversion: where it stopped and why.
#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: ConvertError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, error: impl Into<ConvertError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The single result of one request.
#[derive(Debug)]
pub enum ConversionOutcome {
    Success(Published),
    Failure(PipelineFailure),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    /// The failing stage, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            ConversionOutcome::Success(_) => None,
            ConversionOutcome::Failure(f) => Some(f.stage),
        }
    }

    /// Convert into a `Result` for callers that want to use `?`.
    pub fn into_result(self) -> Result<Published, PipelineFailure> {
        match self {
            ConversionOutcome::Success(p) => Ok(p),
            ConversionOutcome::Failure(f) => Err(f),
        }
    }

    /// A JSON view of the outcome for logs and the CLI's `--json` mode.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConversionOutcome::Success(p) => serde_json::json!({
                "status": "success",
                "bucket": p.bucket,
                "outputPath": p.path,
                "url": p.url,
                "sizeBytes": p.size_bytes,
            }),
            ConversionOutcome::Failure(f) => serde_json::json!({
                "status": "failure",
                "stage": f.stage,
                "kind": f.kind(),
                "error": f.error.to_string(),
            }),
        }
    }
}

impl From<Result<Published, PipelineFailure>> for ConversionOutcome {
    fn from(r: Result<Published, PipelineFailure>) -> Self {
        match r {
            Ok(p) => ConversionOutcome::Success(p),
            Err(f) => ConversionOutcome::Failure(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExitInfo, ValidationError};

    #[test]
    fn stage_names() {
        assert_eq!(Stage::from(ConversionStep::Unpack).as_str(), "conversion-step-1");
        assert_eq!(Stage::from(ConversionStep::Export).as_str(), "conversion-step-2");
        assert_eq!(
            serde_json::to_value(Stage::ConversionStep1).unwrap(),
            "conversion-step-1"
        );
    }

    #[test]
    fn failure_json() {
        let outcome = ConversionOutcome::Failure(PipelineFailure::new(
            Stage::ConversionStep1,
            ConvertError::ToolFailed {
                step: ConversionStep::Unpack,
                tool: "usdcat".into(),
                exit: ExitInfo::Status {
                    code: Some(1),
                    stderr: String::new(),
                },
            },
        ));
        let json = outcome.to_json();
        assert_eq!(json["stage"], "conversion-step-1");
        assert_eq!(json["kind"], "conversion");
        assert!(!outcome.is_success());
        assert_eq!(outcome.failed_stage(), Some(Stage::ConversionStep1));
    }

    #[test]
    fn into_result_roundtrip() {
        let published = Published {
            bucket: "b".into(),
            path: "m.glb".into(),
            url: "gs://b/m.glb".into(),
            size_bytes: 3,
        };
        let outcome = ConversionOutcome::Success(published.clone());
        assert_eq!(outcome.failed_stage(), None);
        assert_eq!(outcome.into_result().unwrap(), published);

        let failed = ConversionOutcome::Failure(PipelineFailure::new(
            Stage::Validation,
            ValidationError::NoFile,
        ));
        let err = failed.into_result().unwrap_err();
        assert_eq!(err.to_string(), "validation failed: No file uploaded");
    }
}
