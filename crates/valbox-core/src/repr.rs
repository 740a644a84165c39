//! Representation model.
//!
//! Answers, for any type known to the compilation, whether values of that
//! type have an unboxed (inline) representation, which inlined class it is,
//! and which static box cache (if any) serves it.
//!
//! ## Builtin classes
//!
//! | Class       | Kind      | Scalar | Box cache |
//! |-------------|-----------|--------|-----------|
//! | `Any`       | reference | -      | -         |
//! | `String`    | reference | -      | -         |
//! | `Boolean`   | inlined   | `bool` | `BOOLEAN` |
//! | `Byte`      | inlined   | `i8`   | `BYTE`    |
//! | `Short`     | inlined   | `i16`  | `SHORT`   |
//! | `Char`      | inlined   | `u16`  | `CHAR`    |
//! | `Int`       | inlined   | `i32`  | `INT`     |
//! | `Long`      | inlined   | `i64`  | `LONG`    |
//! | `Float`     | inlined   | `f32`  | -         |
//! | `Double`    | inlined   | `f64`  | -         |
//! | `NativePtr` | inlined   | `ptr`  | -         |
//!
//! User value classes are appended after the builtins and receive runtime
//! type indices starting at [`RTTI_USER_START`].

use std::fmt;

use crate::box_cache::BoxCache;

/// First runtime type index handed out to user value classes.
pub const RTTI_USER_START: u32 = 32;

/// Identity of a class registered in a [`ClassTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub const ANY: ClassId = ClassId(0);
    pub const STRING: ClassId = ClassId(1);
    pub const BOOLEAN: ClassId = ClassId(2);
    pub const BYTE: ClassId = ClassId(3);
    pub const SHORT: ClassId = ClassId(4);
    pub const CHAR: ClassId = ClassId(5);
    pub const INT: ClassId = ClassId(6);
    pub const LONG: ClassId = ClassId(7);
    pub const FLOAT: ClassId = ClassId(8);
    pub const DOUBLE: ClassId = ClassId(9);
    pub const NATIVE_PTR: ClassId = ClassId(10);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Bit pattern carried by an unboxed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    I8,
    I16,
    /// UTF-16 code unit (unsigned 16-bit).
    Char,
    I32,
    I64,
    F32,
    F64,
    Ptr,
}

impl ScalarKind {
    /// Size in bytes. Pointers take the target's pointer width.
    pub fn size(self, pointer_bytes: u32) -> u32 {
        match self {
            ScalarKind::Bool | ScalarKind::I8 => 1,
            ScalarKind::I16 | ScalarKind::Char => 2,
            ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::F64 => 8,
            ScalarKind::Ptr => pointer_bytes,
        }
    }

    /// Scalars are naturally aligned.
    pub fn align(self, pointer_bytes: u32) -> u32 {
        self.size(pointer_bytes)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::Char => "u16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

/// Machine-level representation of a value at a typed boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Repr {
    /// Bare scalar with no header.
    Unboxed { scalar: ScalarKind, nullable: bool },
    /// Reference to a heap object (`Any` / `Any?`).
    Boxed { nullable: bool },
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, nullable) = match self {
            Repr::Unboxed { scalar, nullable } => (scalar.to_string(), *nullable),
            Repr::Boxed { nullable } => ("Any".to_string(), *nullable),
        };
        if nullable {
            write!(f, "{name}?")
        } else {
            f.write_str(&name)
        }
    }
}

/// A class with both an unboxed and a boxed representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlinedClass {
    scalar: ScalarKind,
    nullable_repr: bool,
    box_target: bool,
    rtti_idx: u32,
}

impl InlinedClass {
    pub fn new(scalar: ScalarKind) -> Self {
        Self {
            scalar,
            nullable_repr: false,
            box_target: true,
            rtti_idx: 0,
        }
    }

    /// A pointer-backed class whose unboxed form can hold null (the zero pointer).
    pub fn nullable_pointer() -> Self {
        Self {
            nullable_repr: true,
            ..Self::new(ScalarKind::Ptr)
        }
    }

    /// Mark the class as never boxed. Requesting conversion functions for it
    /// is a contract violation.
    pub fn without_boxing(mut self) -> Self {
        self.box_target = false;
        self
    }

    pub fn scalar(&self) -> ScalarKind {
        self.scalar
    }

    /// Whether null is representable in the unboxed form. When it is, both
    /// the unboxed and the boxed type of this class are nullable.
    pub fn is_nullable_repr(&self) -> bool {
        self.nullable_repr
    }

    pub fn is_box_target(&self) -> bool {
        self.box_target
    }

    /// Runtime type index stored in object headers of boxed instances.
    pub fn rtti_idx(&self) -> u32 {
        self.rtti_idx
    }

    pub fn unboxed_repr(&self) -> Repr {
        Repr::Unboxed {
            scalar: self.scalar,
            nullable: self.nullable_repr,
        }
    }

    pub fn boxed_repr(&self) -> Repr {
        Repr::Boxed {
            nullable: self.nullable_repr,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Reference,
    Inlined(InlinedClass),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub kind: ClassKind,
}

/// A (possibly nullable) use of a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    pub class: ClassId,
    pub nullable: bool,
}

impl Type {
    pub fn of(class: ClassId) -> Self {
        Self {
            class,
            nullable: false,
        }
    }

    pub fn or_null(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    pub fn any() -> Self {
        Self::of(ClassId::ANY)
    }
}

/// Every class known to one compilation.
#[derive(Clone, Debug)]
pub struct ClassTable {
    classes: Vec<ClassInfo>,
    next_rtti: u32,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassTable {
    /// Create a table holding the builtin classes.
    pub fn new() -> Self {
        let mut table = Self {
            classes: Vec::new(),
            next_rtti: RTTI_USER_START,
        };
        table.push_builtin("Any", ClassKind::Reference);
        table.push_builtin("String", ClassKind::Reference);
        table.push_builtin_inlined("Boolean", InlinedClass::new(ScalarKind::Bool));
        table.push_builtin_inlined("Byte", InlinedClass::new(ScalarKind::I8));
        table.push_builtin_inlined("Short", InlinedClass::new(ScalarKind::I16));
        table.push_builtin_inlined("Char", InlinedClass::new(ScalarKind::Char));
        table.push_builtin_inlined("Int", InlinedClass::new(ScalarKind::I32));
        table.push_builtin_inlined("Long", InlinedClass::new(ScalarKind::I64));
        table.push_builtin_inlined("Float", InlinedClass::new(ScalarKind::F32));
        table.push_builtin_inlined("Double", InlinedClass::new(ScalarKind::F64));
        table.push_builtin_inlined("NativePtr", InlinedClass::nullable_pointer());
        debug_assert_eq!(table.classes.len(), ClassId::NATIVE_PTR.index() + 1);
        table
    }

    fn push_builtin(&mut self, name: &str, kind: ClassKind) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            name: name.to_owned(),
            kind,
        });
        id
    }

    fn push_builtin_inlined(&mut self, name: &str, mut class: InlinedClass) {
        // Builtin type indices mirror their class ids.
        class.rtti_idx = self.classes.len() as u32;
        self.push_builtin(name, ClassKind::Inlined(class));
    }

    pub fn add_reference_class(&mut self, name: impl Into<String>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            name: name.into(),
            kind: ClassKind::Reference,
        });
        id
    }

    /// Register a user value class, assigning it the next free runtime type index.
    pub fn add_inline_class(
        &mut self,
        name: impl Into<String>,
        mut class: InlinedClass,
    ) -> ClassId {
        class.rtti_idx = self.next_rtti;
        self.next_rtti += 1;
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            name: name.into(),
            kind: ClassKind::Inlined(class),
        });
        id
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.index())
    }

    pub fn name(&self, id: ClassId) -> &str {
        self.get(id).map_or("<unknown>", |info| info.name.as_str())
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|info| info.name == name)
            .map(|idx| ClassId(idx as u32))
    }

    pub fn inlined(&self, id: ClassId) -> Option<&InlinedClass> {
        match &self.get(id)?.kind {
            ClassKind::Inlined(class) => Some(class),
            ClassKind::Reference => None,
        }
    }

    /// The inlined class whose unboxed form represents `ty`, if any.
    ///
    /// A nullable use of an inlined class is only unboxed when the class can
    /// represent null itself; otherwise `T?` is an ordinary reference.
    pub fn inline_representation_of(&self, ty: Type) -> Option<ClassId> {
        let class = self.inlined(ty.class)?;
        if ty.nullable && !class.is_nullable_repr() {
            return None;
        }
        Some(ty.class)
    }

    /// Static box cache serving boxed instances of `id`.
    pub fn box_cache_of(&self, id: ClassId) -> Option<BoxCache> {
        BoxCache::ALL.into_iter().find(|cache| cache.class() == id)
    }

    pub fn inlined_classes(&self) -> impl Iterator<Item = (ClassId, &InlinedClass)> {
        self.classes
            .iter()
            .enumerate()
            .filter_map(|(idx, info)| match &info.kind {
                ClassKind::Inlined(class) => Some((ClassId(idx as u32), class)),
                ClassKind::Reference => None,
            })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
