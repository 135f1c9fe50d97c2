//! Pipeline stages for USDZ-to-GLB conversion.
//!
//! Each submodule implements exactly one piece of the request lifecycle.
//! The orchestrator in [`crate::convert`] sequences them; none of them knows
//! about the others beyond the [`workspace::StagedAsset`] handed along.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────── workspace (one per request) ────────────┐
//! request ──▶│ acquire ──▶ stages: usdcat ──▶ usd2gltf ──▶ publish │──▶ store
//! (URL/bytes)│ (.usdz)          (.usd)          (out/.glb)         │
//!            └────────────── always removed on exit ───────────────┘
//! ```
//!
//! 1. [`workspace`] allocates the private scratch directory and removes it
//! 2. [`acquire`] streams a remote URL, or writes uploaded bytes, into it
//! 3. [`stages`] runs the two external tools through a [`tools::ToolInvoker`]
//! 4. [`publish`] copies the output into the injected object store

pub mod acquire;
pub mod publish;
pub mod stages;
pub mod tools;
pub mod workspace;
