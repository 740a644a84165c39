//! Main compiler interface
//!
//! Builds the Cranelift ISA for a [`TargetInfo`] and drives a
//! [`BoxingBackend`] over an object file module.

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_object::{ObjectBuilder, ObjectModule};
use tracing::debug;
use valbox_core::{BackendConfig, ClassTable, TargetInfo};

use crate::backend::BoxingBackend;
use crate::errors::CompilationResult;

/// Build the ISA for `target` with the flags object emission needs.
pub fn build_isa(target: &TargetInfo) -> CompilationResult<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    flag_builder.set("use_colocated_libcalls", "false")?;
    flag_builder.set("is_pic", "false")?;

    let isa_builder = cranelift_codegen::isa::lookup(target.triple().clone())?;
    Ok(isa_builder.finish(settings::Flags::new(flag_builder))?)
}

/// Boxing compiler emitting a relocatable object file
pub struct BoxingCompiler {
    backend: BoxingBackend<ObjectModule>,
}

impl BoxingCompiler {
    /// Create a new compiler for the configured target and output kind
    pub fn new(classes: ClassTable, config: BackendConfig) -> CompilationResult<Self> {
        let isa = build_isa(&config.target)?;
        let object_builder =
            ObjectBuilder::new(isa, "valbox", cranelift_module::default_libcall_names())?;
        let module = ObjectModule::new(object_builder);

        debug!(target = %config.target, output_kind = %config.output_kind, "created object module");
        Ok(BoxingCompiler {
            backend: BoxingBackend::new(module, classes, config)?,
        })
    }

    pub fn backend(&self) -> &BoxingBackend<ObjectModule> {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut BoxingBackend<ObjectModule> {
        &mut self.backend
    }

    /// Finalize the module and get the object file
    pub fn finish(self) -> CompilationResult<Vec<u8>> {
        let product = self.backend.into_module().finish();
        Ok(product.emit()?)
    }
}
