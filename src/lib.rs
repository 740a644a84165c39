//! valbox: value boxing for a Cranelift AOT backend.
//!
//! The heavy lifting lives in the workspace crates:
//! - `valbox-core`: representation model, cache ranges and configuration
//! - `valbox-cranelift`: box/unbox synthesis and static cache emission
//! - `valbox-runtime`: allocator and refcounting linked into programs
//!
//! This crate ties them together for the `valbox` command.

pub mod pipeline;

pub use pipeline::{
    CachePlanEntry, PipelineError, PipelineResult, build_config, cache_plan, compile_conversions,
    emit_object, render_cache_plan, requested_classes,
};
pub use valbox_core::{BackendConfig, ClassTable, OutputKind, TargetInfo};
