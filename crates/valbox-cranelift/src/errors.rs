//! Error types for Cranelift compilation

use derive_more::Display;
use valbox_core::{BoxCache, CacheRange, MAX_CACHE_ENTRIES};

pub type CompilationResult<T> = Result<T, CompilationError>;

#[derive(Display, Debug)]
#[display("{kind}")]
pub struct CompilationError {
    kind: Box<CompilationErrorKind>,
}

impl CompilationError {
    pub fn kind(&self) -> &CompilationErrorKind {
        &self.kind
    }

    /// Internal compiler errors signal a broken contract between compiler
    /// stages; they are never reported as user diagnostics.
    pub fn is_internal(&self) -> bool {
        matches!(
            *self.kind,
            CompilationErrorKind::RepresentationMismatch { .. }
                | CompilationErrorKind::IneligibleBoxClass(_)
                | CompilationErrorKind::NotInlined(_)
        )
    }

    pub(crate) fn representation_mismatch(actual: &str, expected: &str) -> Self {
        CompilationErrorKind::RepresentationMismatch {
            actual: actual.to_owned(),
            expected: expected.to_owned(),
        }
        .into()
    }

    pub(crate) fn ineligible_box_class(name: &str) -> Self {
        CompilationErrorKind::IneligibleBoxClass(name.to_owned()).into()
    }

    pub(crate) fn not_inlined(name: &str) -> Self {
        CompilationErrorKind::NotInlined(name.to_owned()).into()
    }

    pub(crate) fn cache_too_large(cache: BoxCache, range: CacheRange) -> Self {
        CompilationErrorKind::CacheTooLarge {
            cache,
            range,
            limit: MAX_CACHE_ENTRIES,
        }
        .into()
    }
}

#[derive(Display, Debug)]
pub enum CompilationErrorKind {
    #[display("internal error: actual type is {actual}, expected {expected}")]
    RepresentationMismatch { actual: String, expected: String },

    #[display("internal error: {_0} is not used as a box class")]
    IneligibleBoxClass(String),

    #[display("internal error: {_0} has no inline representation")]
    NotInlined(String),

    #[display("{cache} cache range {range} does not fit in {limit} entries")]
    CacheTooLarge {
        cache: BoxCache,
        range: CacheRange,
        limit: u64,
    },

    #[display("Code generation error: {_0}")]
    CodegenError(String),

    #[display("Module error: {_0}")]
    ModuleError(cranelift_module::ModuleError),

    #[display("Cranelift error: {_0}")]
    CraneliftError(String),

    #[display("Invalid target: {_0}")]
    InvalidTarget(String),

    #[display("Object generation failed: {_0}")]
    ObjectError(object::write::Error),
}

impl From<CompilationErrorKind> for CompilationError {
    fn from(kind: CompilationErrorKind) -> Self {
        CompilationError {
            kind: Box::new(kind),
        }
    }
}

macro_rules! impl_from_via_kind {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for CompilationError {
                fn from(error: $source) -> Self {
                    CompilationErrorKind::from(error).into()
                }
            }
        )*
    };
}

impl_from_via_kind!(
    cranelift_module::ModuleError,
    object::write::Error,
    cranelift_codegen::settings::SetError,
    cranelift_codegen::isa::LookupError,
    cranelift_codegen::CodegenError,
);

impl From<cranelift_module::ModuleError> for CompilationErrorKind {
    fn from(error: cranelift_module::ModuleError) -> Self {
        CompilationErrorKind::ModuleError(error)
    }
}

impl From<object::write::Error> for CompilationErrorKind {
    fn from(error: object::write::Error) -> Self {
        CompilationErrorKind::ObjectError(error)
    }
}

impl From<cranelift_codegen::settings::SetError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::settings::SetError) -> Self {
        CompilationErrorKind::CraneliftError(error.to_string())
    }
}

impl From<cranelift_codegen::isa::LookupError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::isa::LookupError) -> Self {
        CompilationErrorKind::InvalidTarget(error.to_string())
    }
}

impl From<cranelift_codegen::CodegenError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::CodegenError) -> Self {
        CompilationErrorKind::CodegenError(error.to_string())
    }
}

impl std::error::Error for CompilationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            CompilationErrorKind::ModuleError(e) => Some(e),
            CompilationErrorKind::ObjectError(e) => Some(e),
            _ => None,
        }
    }
}
