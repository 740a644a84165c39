//! Box and unbox function bodies
//!
//! Box function of class `C`, for a value `v`:
//!
//! 1. If `C` has a nullable unboxed form and `v` is null, return null.
//! 2. If `C` has a static cache and `v` is in its range, return the address
//!    of the pre-built entry `CACHE + (v - from) * stride`.
//! 3. Otherwise allocate a fresh box, write the header (refcount 1 and the
//!    class's runtime type index) and store `v` as its payload.
//!
//! Unbox function of class `C`, for a reference `r`: null maps to the zero
//! value of the unboxed form when `C` allows null; otherwise the payload is
//! loaded from `r`.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types::{I32, I64};
use cranelift_codegen::ir::{Block, InstBuilder, MemFlags, Type, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{DataId, Linkage, Module};
use tracing::debug;
use valbox_core::layout::{INITIAL_REFCOUNT, REFCOUNT_OFFSET, RTTI_OFFSET};
use valbox_core::{BoxLayout, CacheRange, ClassId, InlinedClass};

use crate::cache::ImportedCache;
use crate::errors::CompilationResult;
use crate::functions::{
    ConversionDirection, ConversionFunction, FunctionFlags, Parameter, VALUE_PARAM,
    conversion_symbol,
};
use crate::runtime::RuntimeFunctions;
use crate::types::{conversion_signature, scalar_type, widen_to_i64, zero_value};

/// Where a box function finds pre-built boxes.
#[derive(Clone, Copy, Debug)]
pub(crate) enum CacheSite {
    /// Range fixed at compile time, entries defined in this module.
    Static { range: CacheRange, entries: DataId },
    /// Bounds and entries come from the binary this code is linked into.
    Imported(ImportedCache),
}

/// Declare and define the conversion function of `class` in `direction`.
pub(crate) fn synthesize<M: Module>(
    module: &mut M,
    runtime: &RuntimeFunctions,
    class_id: ClassId,
    class_name: &str,
    class: &InlinedClass,
    direction: ConversionDirection,
    cache: Option<CacheSite>,
) -> CompilationResult<ConversionFunction> {
    let (param, returns) = match direction {
        ConversionDirection::Box => (class.unboxed_repr(), class.boxed_repr()),
        ConversionDirection::Unbox => (class.boxed_repr(), class.unboxed_repr()),
    };
    let symbol = conversion_symbol(class_name, direction);
    let signature = conversion_signature(module, param, returns);
    let func_id = module.declare_function(&symbol, Linkage::Local, &signature)?;

    let mut ctx = module.make_context();
    ctx.func.signature = signature;
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut ctx.func, &mut func_ctx);

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    builder.seal_block(entry);
    let value = builder.block_params(entry)[0];

    let pointer_type = module.target_config().pointer_type();
    let mut body = BodyBuilder {
        module: &mut *module,
        builder: &mut builder,
        class,
        pointer_type,
    };
    match direction {
        ConversionDirection::Box => body.box_body(runtime, cache, value),
        ConversionDirection::Unbox => body.unbox_body(value),
    }
    builder.finalize();
    module.define_function(func_id, &mut ctx)?;

    debug!(%symbol, %param, %returns, "synthesized conversion function");
    Ok(ConversionFunction {
        direction,
        class: class_id,
        symbol,
        func_id,
        param: Parameter {
            name: VALUE_PARAM,
            repr: param,
        },
        returns,
        flags: FunctionFlags::CONVERSION,
    })
}

struct BodyBuilder<'a, 'b, M: Module> {
    module: &'a mut M,
    builder: &'a mut FunctionBuilder<'b>,
    class: &'a InlinedClass,
    pointer_type: Type,
}

impl<M: Module> BodyBuilder<'_, '_, M> {
    fn pointer_bytes(&self) -> u32 {
        self.pointer_type.bytes()
    }

    fn layout(&self) -> BoxLayout {
        BoxLayout::of(self.class.scalar(), self.pointer_bytes())
    }

    fn box_body(&mut self, runtime: &RuntimeFunctions, cache: Option<CacheSite>, value: Value) {
        let alloc_block = self.builder.create_block();

        if self.class.is_nullable_repr() {
            let null_block = self.builder.create_block();
            let is_null = self.builder.ins().icmp_imm(IntCC::Equal, value, 0);
            self.builder
                .ins()
                .brif(is_null, null_block, &[], alloc_block, &[]);

            self.builder.switch_to_block(null_block);
            self.builder.seal_block(null_block);
            let null = self.builder.ins().iconst(self.pointer_type, 0);
            self.builder.ins().return_(&[null]);
        } else {
            match cache {
                Some(CacheSite::Static { range, .. }) if range.is_empty() => {
                    self.builder.ins().jump(alloc_block, &[]);
                }
                Some(CacheSite::Static { range, entries }) => {
                    let wide = widen_to_i64(self.builder, self.class.scalar(), value);
                    let from = self.builder.ins().iconst(I64, range.start);
                    let to = self.builder.ins().iconst(I64, range.end);
                    self.cached_lookup(wide, from, to, entries, alloc_block);
                }
                Some(CacheSite::Imported(imported)) => {
                    let wide = widen_to_i64(self.builder, self.class.scalar(), value);
                    let from = self.load_bound(imported.range_from);
                    let to = self.load_bound(imported.range_to);
                    self.cached_lookup(wide, from, to, imported.entries, alloc_block);
                }
                None => {
                    self.builder.ins().jump(alloc_block, &[]);
                }
            }
        }

        self.builder.switch_to_block(alloc_block);
        self.builder.seal_block(alloc_block);
        let object = self.allocate_box(runtime);
        let layout = self.layout();
        self.builder.ins().store(
            MemFlags::trusted(),
            value,
            object,
            layout.payload_offset as i32,
        );
        self.builder.ins().return_(&[object]);
    }

    /// Branch to the cache entry of `wide` when `from <= wide <= to`, else to `miss`.
    fn cached_lookup(&mut self, wide: Value, from: Value, to: Value, entries: DataId, miss: Block) {
        let hit_block = self.builder.create_block();
        let above = self
            .builder
            .ins()
            .icmp(IntCC::SignedGreaterThanOrEqual, wide, from);
        let below = self
            .builder
            .ins()
            .icmp(IntCC::SignedLessThanOrEqual, wide, to);
        let in_range = self.builder.ins().band(above, below);
        self.builder.ins().brif(in_range, hit_block, &[], miss, &[]);

        self.builder.switch_to_block(hit_block);
        self.builder.seal_block(hit_block);
        let stride = i64::from(self.layout().stride);
        let index = self.builder.ins().isub(wide, from);
        let mut offset = self.builder.ins().imul_imm(index, stride);
        if self.pointer_type != I64 {
            offset = self.builder.ins().ireduce(self.pointer_type, offset);
        }
        let global = self.module.declare_data_in_func(entries, self.builder.func);
        let base = self.builder.ins().global_value(self.pointer_type, global);
        let object = self.builder.ins().iadd(base, offset);
        self.builder.ins().return_(&[object]);
    }

    /// Load an imported range bound and widen it like the boxed value.
    fn load_bound(&mut self, data: DataId) -> Value {
        let scalar = self.class.scalar();
        let ty = scalar_type(scalar, self.pointer_type);
        let global = self.module.declare_data_in_func(data, self.builder.func);
        let address = self.builder.ins().global_value(self.pointer_type, global);
        let bound = self
            .builder
            .ins()
            .load(ty, MemFlags::trusted().with_readonly(), address, 0);
        widen_to_i64(self.builder, scalar, bound)
    }

    /// Call the runtime allocator and initialize the object header.
    fn allocate_box(&mut self, runtime: &RuntimeFunctions) -> Value {
        let layout = self.layout();
        let alloc = self
            .module
            .declare_func_in_func(runtime.alloc, self.builder.func);
        let size = self.builder.ins().iconst(I64, i64::from(layout.size));
        let call = self.builder.ins().call(alloc, &[size]);
        let object = self.builder.inst_results(call)[0];

        let refcount = self
            .builder
            .ins()
            .iconst(I32, i64::from(INITIAL_REFCOUNT));
        self.builder
            .ins()
            .store(MemFlags::trusted(), refcount, object, REFCOUNT_OFFSET);
        let rtti = self
            .builder
            .ins()
            .iconst(I32, i64::from(self.class.rtti_idx()));
        self.builder
            .ins()
            .store(MemFlags::trusted(), rtti, object, RTTI_OFFSET);
        object
    }

    fn unbox_body(&mut self, reference: Value) {
        let scalar = self.class.scalar();
        let ty = scalar_type(scalar, self.pointer_type);

        if self.class.is_nullable_repr() {
            let null_block = self.builder.create_block();
            let load_block = self.builder.create_block();
            let is_null = self.builder.ins().icmp_imm(IntCC::Equal, reference, 0);
            self.builder
                .ins()
                .brif(is_null, null_block, &[], load_block, &[]);

            self.builder.switch_to_block(null_block);
            self.builder.seal_block(null_block);
            let zero = zero_value(self.builder, ty);
            self.builder.ins().return_(&[zero]);

            self.builder.switch_to_block(load_block);
            self.builder.seal_block(load_block);
        }

        let offset = self.layout().payload_offset as i32;
        let payload = self
            .builder
            .ins()
            .load(ty, MemFlags::trusted(), reference, offset);
        self.builder.ins().return_(&[payload]);
    }
}
