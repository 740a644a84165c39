//! Cranelift backend for value boxing
//!
//! This crate synthesizes the box and unbox functions that move values of
//! inlined classes between their unboxed and boxed forms, and emits the
//! static caches of pre-built boxes that box functions hand out for small
//! values.

pub mod backend;
pub mod cache;
mod codegen;
pub mod compiler;
pub mod conversion;
pub mod errors;
pub mod functions;
pub mod runtime;
pub mod types;


pub use backend::BoxingBackend;
pub use cache::{CacheTable, CacheTables, initialize_cached_boxes};
pub use compiler::{BoxingCompiler, build_isa};
pub use conversion::{ConversionKind, resolve_conversion};
pub use errors::{CompilationError, CompilationErrorKind, CompilationResult};
pub use functions::{ConversionDirection, ConversionFunction, FunctionFlags};

use valbox_core::{BackendConfig, ClassId, ClassTable};

/// Compile box and unbox functions for each of `requested` into an object file.
pub fn compile_to_object(
    classes: ClassTable,
    config: BackendConfig,
    requested: &[ClassId],
) -> CompilationResult<Vec<u8>> {
    let mut compiler = BoxingCompiler::new(classes, config)?;
    for &class in requested {
        compiler.backend_mut().box_function(class)?;
        compiler.backend_mut().unbox_function(class)?;
    }
    compiler.finish()
}
