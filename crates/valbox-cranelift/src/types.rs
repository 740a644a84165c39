//! Representation → Cranelift type mapping
//!
//! Unboxed scalars map to the narrowest Cranelift type that holds them;
//! every boxed value is a pointer.

use cranelift_codegen::ir::types::{F32, F64, I8, I16, I32, I64};
use cranelift_codegen::ir::{AbiParam, InstBuilder, Signature, Type, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::Module;
use valbox_core::{Repr, ScalarKind};

/// Cranelift type carrying `scalar`.
pub fn scalar_type(scalar: ScalarKind, pointer_type: Type) -> Type {
    match scalar {
        ScalarKind::Bool | ScalarKind::I8 => I8,
        ScalarKind::I16 | ScalarKind::Char => I16,
        ScalarKind::I32 => I32,
        ScalarKind::I64 => I64,
        ScalarKind::F32 => F32,
        ScalarKind::F64 => F64,
        ScalarKind::Ptr => pointer_type,
    }
}

pub fn repr_type(repr: Repr, pointer_type: Type) -> Type {
    match repr {
        Repr::Unboxed { scalar, .. } => scalar_type(scalar, pointer_type),
        Repr::Boxed { .. } => pointer_type,
    }
}

/// Signature of a one-argument conversion in the module's default calling convention.
pub fn conversion_signature<M: Module>(module: &M, param: Repr, returns: Repr) -> Signature {
    let pointer_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(repr_type(param, pointer_type)));
    sig.returns.push(AbiParam::new(repr_type(returns, pointer_type)));
    sig
}

/// The all-zero value of `ty`.
pub(crate) fn zero_value(builder: &mut FunctionBuilder<'_>, ty: Type) -> Value {
    if ty == F32 {
        builder.ins().f32const(0.0)
    } else if ty == F64 {
        builder.ins().f64const(0.0)
    } else {
        builder.ins().iconst(ty, 0)
    }
}

/// Extend an integer scalar to `I64` according to its signedness.
///
/// Cache range checks compare in 64 bits so that bounds of any kind can be
/// materialized without truncation.
pub(crate) fn widen_to_i64(
    builder: &mut FunctionBuilder<'_>,
    scalar: ScalarKind,
    value: Value,
) -> Value {
    match scalar {
        ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 => builder.ins().sextend(I64, value),
        ScalarKind::Bool | ScalarKind::Char => builder.ins().uextend(I64, value),
        ScalarKind::I64 | ScalarKind::F32 | ScalarKind::F64 | ScalarKind::Ptr => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_types() {
        assert_eq!(scalar_type(ScalarKind::Bool, I64), I8);
        assert_eq!(scalar_type(ScalarKind::Char, I64), I16);
        assert_eq!(scalar_type(ScalarKind::F64, I64), F64);
        assert_eq!(scalar_type(ScalarKind::Ptr, I32), I32);
    }

    #[test]
    fn test_boxed_is_pointer() {
        assert_eq!(repr_type(Repr::Boxed { nullable: true }, I64), I64);
        assert_eq!(repr_type(Repr::Boxed { nullable: false }, I32), I32);
        assert_eq!(
            repr_type(
                Repr::Unboxed {
                    scalar: ScalarKind::I16,
                    nullable: false
                },
                I64
            ),
            I16
        );
    }
}
