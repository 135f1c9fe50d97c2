//! # usdz2glb
//!
//! Convert USDZ archives to binary glTF (GLB) and publish the result to an
//! object store.
//!
//! ## Why this crate?
//!
//! The actual conversion is done by two external programs from the USD
//! ecosystem (`usdcat` and `usd2gltf`). What they do not give you is
//! everything around them: getting the source onto disk, giving each request
//! its own scratch space, attributing a failure to the right step, and
//! making sure nothing is left behind, neither a half-written object in the
//! store nor a stray file on the conversion host. This crate is that
//! orchestration, plus a small HTTP service and CLI on top of it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request (URL or uploaded bytes) + destination
//!  │
//!  ├─ 0. Validate   pure checks: URL, extension, destination path
//!  ├─ 1. Workspace  fresh temp dir, removed on every exit path
//!  ├─ 2. Acquire    stream the URL / write the upload into the workspace
//!  ├─ 3. Step 1     usdcat   model.usdz ─▶ model.usd
//!  ├─ 4. Step 2     usd2gltf model.usd  ─▶ out/model.glb
//!  └─ 5. Publish    atomic put into the ObjectStore
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use usdz2glb::{ConversionRequest, ConversionService, ConverterConfig, LocalObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(LocalObjectStore::new("/var/lib/usdz2glb"));
//!     let service = ConversionService::with_process_tools(ConverterConfig::default(), store)?;
//!
//!     let request = ConversionRequest::remote(
//!         "https://example.com/assets/chair.usdz?sig=abc",
//!         "models",
//!         "furniture/chair.glb",
//!     );
//!     let published = service.convert(request).await.into_result()?;
//!     println!("{} ({} bytes)", published.url, published.size_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `usdz2glb` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! The HTTP [`server`] module is always available; only the binary is gated.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod observer;
pub mod outcome;
pub mod pipeline;
pub mod request;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterConfig, ConverterConfigBuilder};
pub use convert::{ConversionService, Pipeline, PipelineState};
pub use error::{ConversionStep, ConvertError, ErrorKind, ExitInfo, ValidationError};
pub use observer::{NoopObserver, PipelineObserver, SharedObserver};
pub use outcome::{ConversionOutcome, PipelineFailure, Published, Stage};
pub use pipeline::tools::{ProcessToolInvoker, ToolCommand, ToolExit, ToolInvoker};
pub use request::{parse_remote_payload, ConversionRequest, Destination, SourceSpec};
pub use store::{GcsObjectStore, InMemoryObjectStore, LocalObjectStore, ObjectStore, StoreError, StoredObject};
