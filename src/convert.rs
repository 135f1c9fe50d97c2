//! The pipeline orchestrator.
//!
//! ## Why a consuming `Pipeline::run`?
//!
//! A [`Pipeline`] is the state machine for exactly one request. `run` takes
//! `self` by value, so the compiler guarantees an instance can never be
//! reused and no state leaks from one request into the next. Everything
//! shared between requests lives in [`ConversionService`], and all of that is
//! immutable or `Send + Sync` (the store client and the tool invoker).
//!
//! ## State machine
//!
//! ```text
//! Idle ──▶ Acquiring ──▶ Converting ──▶ Publishing ──▶ Done
//!   │          │             │              │
//!   └──────────┴─────────────┴──────────────┴────────▶ Failed
//! ```
//!
//! Transitions only move forward. Validation happens while `Idle`, before a
//! workspace exists, so a rejected request has no side effects. Once a
//! workspace is open it is closed on every path out of the machine.

use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::observer::{NoopObserver, PipelineObserver, SharedObserver};
use crate::outcome::{ConversionOutcome, PipelineFailure, Published, Stage};
use crate::pipeline::acquire::{HttpFetcher, SourceAcquirer};
use crate::pipeline::publish::ResultPublisher;
use crate::pipeline::stages::StageRunner;
use crate::pipeline::tools::{ProcessToolInvoker, ToolInvoker};
use crate::pipeline::workspace::{Workspace, WorkspaceManager};
use crate::request::{ConversionPlan, ConversionRequest};
use crate::store::ObjectStore;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Where a [`Pipeline`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Acquiring,
    Converting,
    Publishing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Acquiring => "acquiring",
            PipelineState::Converting => "converting",
            PipelineState::Publishing => "publishing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Long-lived conversion front end. Cheap to clone; every clone shares the
/// same store client, fetch client and tool invoker.
#[derive(Clone)]
pub struct ConversionService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: ConverterConfig,
    workspaces: WorkspaceManager,
    fetcher: HttpFetcher,
    acquirer: SourceAcquirer,
    runner: StageRunner,
    publisher: ResultPublisher,
}

impl ConversionService {
    /// Build a service over an explicit store and tool invoker.
    ///
    /// # Errors
    /// Fails only if the HTTP client for remote fetches cannot be built.
    pub fn new(
        config: ConverterConfig,
        store: Arc<dyn ObjectStore>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> Result<Self, ConvertError> {
        let fetcher = HttpFetcher::new(config.download_timeout_secs)?;
        let inner = ServiceInner {
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            acquirer: SourceAcquirer::new(fetcher.clone(), config.input_extension.clone()),
            fetcher,
            runner: StageRunner::new(invoker, &config),
            publisher: ResultPublisher::new(store),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Build a service that runs the real tools found on `PATH`.
    pub fn with_process_tools(
        config: ConverterConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConvertError> {
        Self::new(config, store, Arc::new(ProcessToolInvoker))
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.inner.config
    }

    /// The HTTP client used for remote sources.
    pub fn fetcher(&self) -> &HttpFetcher {
        &self.inner.fetcher
    }

    /// Run one request to completion. Always returns exactly one outcome.
    pub async fn convert(&self, request: ConversionRequest) -> ConversionOutcome {
        self.convert_observed(request, Arc::new(NoopObserver)).await
    }

    /// Like [`convert`](Self::convert), reporting progress to `observer`.
    pub async fn convert_observed(
        &self,
        request: ConversionRequest,
        observer: SharedObserver,
    ) -> ConversionOutcome {
        let id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("convert", request_id = %id);
        Pipeline::new(&self.inner, observer)
            .run(request)
            .instrument(span)
            .await
    }
}

impl fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// The state machine for one request.
pub struct Pipeline<'a> {
    service: &'a ServiceInner,
    observer: SharedObserver,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    fn new(service: &'a ServiceInner, observer: SharedObserver) -> Self {
        Self {
            service,
            observer,
            state: PipelineState::Idle,
        }
    }

    /// Drive `request` through every stage. Consumes the pipeline.
    pub async fn run(mut self, request: ConversionRequest) -> ConversionOutcome {
        let started = Instant::now();
        info!("Starting conversion → {}", request.destination);

        // ── Validation (no side effects) ─────────────────────────────────
        let plan = match request.into_plan(&self.service.config) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Rejected request: {}", e);
                return self.finish(Err(PipelineFailure::new(Stage::Validation, e)), started);
            }
        };
        debug!("Plan: {:?}", plan);

        // ── Workspace ────────────────────────────────────────────────────
        let workspace = match self.service.workspaces.open().await {
            Ok(ws) => ws,
            Err(e) => {
                let error = ConvertError::Unexpected(format!("Failed to allocate workspace: {e}"));
                return self.finish(Err(PipelineFailure::new(Stage::Workspace, error)), started);
            }
        };
        self.observer.on_workspace_opened(workspace.path());

        let result = self.execute(&workspace, &plan).await;

        // Teardown runs before the terminal transition is reported.
        self.service.workspaces.close(workspace).await;

        self.finish(result, started)
    }

    async fn execute(
        &mut self,
        workspace: &Workspace,
        plan: &ConversionPlan,
    ) -> Result<Published, PipelineFailure> {
        let service = self.service;

        self.transition(PipelineState::Acquiring);
        let input = service
            .acquirer
            .acquire(workspace, &plan.source)
            .await
            .map_err(|e| PipelineFailure::new(Stage::Acquisition, e))?;

        self.transition(PipelineState::Converting);
        let output = service
            .runner
            .run(
                workspace,
                input,
                &plan.output_filename,
                self.observer.as_ref(),
            )
            .await
            .map_err(|e| PipelineFailure::new(conversion_stage(&e), e))?;

        self.transition(PipelineState::Publishing);
        service
            .publisher
            .publish(&output, &plan.destination)
            .await
            .map_err(|e| PipelineFailure::new(Stage::Publication, e))
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        debug_assert!(!from.is_terminal(), "transition out of terminal state {from}");
        info!("Pipeline {} → {}", from, to);
        self.state = to;
        self.observer.on_state_change(from, to);
    }

    fn finish(
        mut self,
        result: Result<Published, PipelineFailure>,
        started: Instant,
    ) -> ConversionOutcome {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(published) => {
                self.transition(PipelineState::Done);
                info!(
                    "Conversion successful: {}/{} ({} bytes) in {}ms",
                    published.bucket, published.path, published.size_bytes, elapsed_ms
                );
            }
            Err(failure) => {
                self.transition(PipelineState::Failed);
                warn!("Conversion failed after {}ms: {}", elapsed_ms, failure);
            }
        }

        let outcome = ConversionOutcome::from(result);
        self.observer.on_finished(&outcome);
        outcome
    }
}

fn conversion_stage(error: &ConvertError) -> Stage {
    match error {
        ConvertError::ToolFailed { step, .. } => Stage::from(*step),
        _ => Stage::ConversionStep1,
    }
}
