//! Runtime function declarations
//!
//! Compiled boxing code calls into `valbox-runtime` for heap allocation.

use cranelift_codegen::ir::AbiParam;
use cranelift_codegen::ir::types::I64;
use cranelift_module::{FuncId, Linkage, Module};

use crate::errors::CompilationResult;

/// Symbol of the runtime allocator.
pub const ALLOC_FN: &str = "__valbox_alloc";

/// Runtime function IDs
pub struct RuntimeFunctions {
    /// `__valbox_alloc(size: u64) -> *mut u8`
    pub alloc: FuncId,
}

impl RuntimeFunctions {
    /// Declare all runtime functions in the module
    pub fn declare_all<M: Module>(module: &mut M) -> CompilationResult<Self> {
        let pointer = module.target_config().pointer_type();

        let mut alloc_sig = module.make_signature();
        alloc_sig.params.push(AbiParam::new(I64));
        alloc_sig.returns.push(AbiParam::new(pointer));
        let alloc = module.declare_function(ALLOC_FN, Linkage::Import, &alloc_sig)?;

        Ok(RuntimeFunctions { alloc })
    }
}
