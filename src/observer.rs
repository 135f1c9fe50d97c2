//! Observer trait for pipeline lifecycle events.
//!
//! Pass an [`Arc<dyn PipelineObserver>`] to
//! [`crate::ConversionService::convert_observed`] to receive events as one
//! request moves through its stages. The CLI uses it to drive a spinner;
//! tests use it to assert the exact state sequence.
//!
//! All methods have no-op defaults, so implementors only override what they
//! care about.
//!
//! ```rust
//! use usdz2glb::{PipelineObserver, PipelineState};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<PipelineState>>);
//!
//! impl PipelineObserver for Recorder {
//!     fn on_state_change(&self, _from: PipelineState, to: PipelineState) {
//!         self.0.lock().unwrap().push(to);
//!     }
//! }
//! ```

use crate::convert::PipelineState;
use crate::error::ConversionStep;
use crate::outcome::ConversionOutcome;
use crate::pipeline::tools::ToolCommand;
use std::path::Path;
use std::sync::Arc;

/// Receives events from one pipeline run.
///
/// Implementations must be `Send + Sync`: a pipeline runs on its own task,
/// and one observer may be shared by many concurrent pipelines.
pub trait PipelineObserver: Send + Sync {
    /// Called on every state transition, including the final one into
    /// `Done` or `Failed`.
    fn on_state_change(&self, from: PipelineState, to: PipelineState) {
        let _ = (from, to);
    }

    /// Called once the request's workspace exists.
    fn on_workspace_opened(&self, path: &Path) {
        let _ = path;
    }

    /// Called just before an external tool is launched.
    fn on_tool_started(&self, step: ConversionStep, command: &ToolCommand) {
        let _ = (step, command);
    }

    /// Called exactly once, after teardown, with the final outcome.
    fn on_finished(&self, outcome: &ConversionOutcome) {
        let _ = outcome;
    }
}

/// An observer that ignores everything. The default.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Convenience alias for shared observers.
pub type SharedObserver = Arc<dyn PipelineObserver>;
