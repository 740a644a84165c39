//! Conversion resolution.
//!
//! Given the type a value has and the type a use site expects, decide
//! whether a box or unbox function must be applied. Only the inline
//! representation of each side matters:
//!
//! | actual    | expected  | conversion          |
//! |-----------|-----------|---------------------|
//! | same      | same      | none                |
//! | inlined C | reference | box with C          |
//! | reference | inlined C | unbox with C        |
//! | inlined C | inlined D | internal error      |
//!
//! The last row means an earlier lowering stage skipped an explicit
//! conversion, so it is reported as an internal error rather than guessed.

use valbox_core::{ClassId, ClassTable, Type};

use crate::errors::{CompilationError, CompilationResult};

/// Conversion to apply between two types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    /// Representations already agree.
    None,
    /// Box the value with the class's box function.
    Box(ClassId),
    /// Unbox the value with the class's unbox function.
    Unbox(ClassId),
}

impl ConversionKind {
    pub fn class(self) -> Option<ClassId> {
        match self {
            ConversionKind::None => None,
            ConversionKind::Box(class) | ConversionKind::Unbox(class) => Some(class),
        }
    }
}

/// Resolve the conversion from `actual` to `expected`.
pub fn resolve_conversion(
    classes: &ClassTable,
    actual: Type,
    expected: Type,
) -> CompilationResult<ConversionKind> {
    resolve_inlined(
        classes,
        classes.inline_representation_of(actual),
        classes.inline_representation_of(expected),
    )
}

/// Resolve from already computed inline representations.
pub fn resolve_inlined(
    classes: &ClassTable,
    actual: Option<ClassId>,
    expected: Option<ClassId>,
) -> CompilationResult<ConversionKind> {
    if actual == expected {
        return Ok(ConversionKind::None);
    }
    match (actual, expected) {
        (Some(class), None) => Ok(ConversionKind::Box(class)),
        (None, Some(class)) => Ok(ConversionKind::Unbox(class)),
        (Some(actual), Some(expected)) => Err(CompilationError::representation_mismatch(
            classes.name(actual),
            classes.name(expected),
        )),
        (None, None) => Ok(ConversionKind::None),
    }
}
