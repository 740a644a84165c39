//! Conversion function descriptors and their memo table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::Rc;

use cranelift_codegen::ir::{InstBuilder, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{FuncId, Module};
use tracing::trace;
use valbox_core::{ClassId, Repr};

use crate::errors::CompilationResult;

/// Name of the single parameter of every conversion function.
pub const VALUE_PARAM: &str = "value";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionDirection {
    Box,
    Unbox,
}

impl ConversionDirection {
    /// Reserved function name, not expressible in source code.
    pub fn special_name(self) -> &'static str {
        match self {
            ConversionDirection::Box => "<box>",
            ConversionDirection::Unbox => "<unbox>",
        }
    }
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.special_name())
    }
}

/// Declaration-level attributes of a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionFlags {
    pub public: bool,
    /// Can be overridden in a subclass.
    pub open: bool,
    pub external: bool,
    pub inline: bool,
    pub tailrec: bool,
    pub suspend: bool,
}

impl FunctionFlags {
    /// Conversion functions are public and final, and nothing else.
    pub const CONVERSION: FunctionFlags = FunctionFlags {
        public: true,
        open: false,
        external: false,
        inline: false,
        tailrec: false,
        suspend: false,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub repr: Repr,
}

/// A synthesized box or unbox function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionFunction {
    pub direction: ConversionDirection,
    /// The inlined class the function converts.
    pub class: ClassId,
    /// Symbol in the emitted module, e.g. `Int.<box>`.
    pub symbol: String,
    pub func_id: FuncId,
    pub param: Parameter,
    pub returns: Repr,
    pub flags: FunctionFlags,
}

impl ConversionFunction {
    pub fn name(&self) -> &'static str {
        self.direction.special_name()
    }

    /// Emit a call to this function from the function being built.
    pub fn call<M: Module>(
        &self,
        module: &mut M,
        builder: &mut FunctionBuilder<'_>,
        value: Value,
    ) -> Value {
        let callee = module.declare_func_in_func(self.func_id, builder.func);
        let call = builder.ins().call(callee, &[value]);
        builder.inst_results(call)[0]
    }
}

/// Symbol of the conversion function of `class_name` in `direction`.
pub fn conversion_symbol(class_name: &str, direction: ConversionDirection) -> String {
    format!("{class_name}.{direction}")
}

/// At most one box and one unbox function per class.
#[derive(Debug, Default)]
pub struct ConversionFunctions {
    boxes: HashMap<ClassId, Rc<ConversionFunction>>,
    unboxes: HashMap<ClassId, Rc<ConversionFunction>>,
}

impl ConversionFunctions {
    pub fn get(
        &self,
        direction: ConversionDirection,
        class: ClassId,
    ) -> Option<&Rc<ConversionFunction>> {
        self.table(direction).get(&class)
    }

    /// Return the memoized function, building and recording it on first use.
    ///
    /// A failing `build` records nothing.
    pub fn get_or_try_insert_with<F>(
        &mut self,
        direction: ConversionDirection,
        class: ClassId,
        build: F,
    ) -> CompilationResult<Rc<ConversionFunction>>
    where
        F: FnOnce() -> CompilationResult<ConversionFunction>,
    {
        match self.table_mut(direction).entry(class) {
            Entry::Occupied(entry) => {
                trace!(?class, %direction, "reusing conversion function");
                Ok(Rc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let function = Rc::new(build()?);
                Ok(Rc::clone(entry.insert(function)))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.boxes.len() + self.unboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<ConversionFunction>> {
        self.boxes.values().chain(self.unboxes.values())
    }

    fn table(&self, direction: ConversionDirection) -> &HashMap<ClassId, Rc<ConversionFunction>> {
        match direction {
            ConversionDirection::Box => &self.boxes,
            ConversionDirection::Unbox => &self.unboxes,
        }
    }

    fn table_mut(
        &mut self,
        direction: ConversionDirection,
    ) -> &mut HashMap<ClassId, Rc<ConversionFunction>> {
        match direction {
            ConversionDirection::Box => &mut self.boxes,
            ConversionDirection::Unbox => &mut self.unboxes,
        }
    }
}
