//! Boxing backend state for one compilation.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::rc::Rc;

use cranelift_codegen::ir::Value;
use cranelift_frontend::FunctionBuilder;
use cranelift_module::Module;
use valbox_core::{BackendConfig, BoxCache, ClassId, ClassTable, InlinedClass, Type};

use crate::cache::{CacheTables, ImportedCache, import_cache, initialize_cached_boxes};
use crate::codegen::{CacheSite, synthesize};
use crate::conversion::{ConversionKind, resolve_conversion};
use crate::errors::{CompilationError, CompilationResult};
use crate::functions::{ConversionDirection, ConversionFunction, ConversionFunctions};
use crate::runtime::RuntimeFunctions;

/// Owns the module being built and everything the boxing subsystem
/// remembers across requests: the runtime declarations, the static cache
/// tables and the synthesized conversion functions.
pub struct BoxingBackend<M: Module> {
    module: M,
    classes: ClassTable,
    config: BackendConfig,
    runtime: RuntimeFunctions,
    cache_tables: Option<CacheTables>,
    imported_caches: HashMap<BoxCache, ImportedCache>,
    conversions: ConversionFunctions,
}

impl<M: Module> BoxingBackend<M> {
    /// Set up the backend on `module`.
    ///
    /// Static box caches are emitted here, before any box function that
    /// refers to them can be synthesized.
    pub fn new(
        mut module: M,
        classes: ClassTable,
        config: BackendConfig,
    ) -> CompilationResult<Self> {
        let runtime = RuntimeFunctions::declare_all(&mut module)?;
        let cache_tables = initialize_cached_boxes(&mut module, &classes, &config)?;
        Ok(Self {
            module,
            classes,
            config,
            runtime,
            cache_tables,
            imported_caches: HashMap::new(),
            conversions: ConversionFunctions::default(),
        })
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeFunctions {
        &self.runtime
    }

    /// Emitted cache tables, `None` for outputs that are not native binaries.
    pub fn cache_tables(&self) -> Option<&CacheTables> {
        self.cache_tables.as_ref()
    }

    pub fn conversions(&self) -> &ConversionFunctions {
        &self.conversions
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn module_mut(&mut self) -> &mut M {
        &mut self.module
    }

    pub fn into_module(self) -> M {
        self.module
    }

    pub fn resolve_conversion(
        &self,
        actual: Type,
        expected: Type,
    ) -> CompilationResult<ConversionKind> {
        resolve_conversion(&self.classes, actual, expected)
    }

    /// Conversion function turning a value of `actual` into one of
    /// `expected`, or `None` when no conversion is needed.
    pub fn type_conversion(
        &mut self,
        actual: Type,
        expected: Type,
    ) -> CompilationResult<Option<Rc<ConversionFunction>>> {
        match resolve_conversion(&self.classes, actual, expected)? {
            ConversionKind::None => Ok(None),
            ConversionKind::Box(class) => self.box_function(class).map(Some),
            ConversionKind::Unbox(class) => self.unbox_function(class).map(Some),
        }
    }

    /// Convert `value` in the function being built, returning it unchanged
    /// when the representations already agree.
    pub fn convert_value(
        &mut self,
        builder: &mut FunctionBuilder<'_>,
        actual: Type,
        expected: Type,
        value: Value,
    ) -> CompilationResult<Value> {
        match self.type_conversion(actual, expected)? {
            Some(function) => Ok(function.call(&mut self.module, builder, value)),
            None => Ok(value),
        }
    }

    pub fn box_function(&mut self, class: ClassId) -> CompilationResult<Rc<ConversionFunction>> {
        self.conversion_function(ConversionDirection::Box, class)
    }

    pub fn unbox_function(&mut self, class: ClassId) -> CompilationResult<Rc<ConversionFunction>> {
        self.conversion_function(ConversionDirection::Unbox, class)
    }

    fn conversion_function(
        &mut self,
        direction: ConversionDirection,
        class_id: ClassId,
    ) -> CompilationResult<Rc<ConversionFunction>> {
        let Self {
            module,
            classes,
            runtime,
            cache_tables,
            imported_caches,
            conversions,
            ..
        } = self;

        conversions.get_or_try_insert_with(direction, class_id, || {
            let class = box_class(classes, class_id)?;
            let cache = match direction {
                ConversionDirection::Box => {
                    cache_site(module, classes, cache_tables.as_ref(), imported_caches, class_id)?
                }
                ConversionDirection::Unbox => None,
            };
            synthesize(
                module,
                runtime,
                class_id,
                classes.name(class_id),
                class,
                direction,
                cache,
            )
        })
    }
}

/// The inlined class behind `id`, if conversion functions may exist for it.
fn box_class(classes: &ClassTable, id: ClassId) -> CompilationResult<&InlinedClass> {
    let class = classes
        .inlined(id)
        .ok_or_else(|| CompilationError::not_inlined(classes.name(id)))?;
    if !class.is_box_target() {
        return Err(CompilationError::ineligible_box_class(classes.name(id)));
    }
    Ok(class)
}

fn cache_site<M: Module>(
    module: &mut M,
    classes: &ClassTable,
    cache_tables: Option<&CacheTables>,
    imported_caches: &mut HashMap<BoxCache, ImportedCache>,
    class: ClassId,
) -> CompilationResult<Option<CacheSite>> {
    let Some(cache) = classes.box_cache_of(class) else {
        return Ok(None);
    };

    if let Some(tables) = cache_tables {
        return Ok(tables.get(cache).map(|table| CacheSite::Static {
            range: table.range,
            entries: table.entries,
        }));
    }

    let imported = match imported_caches.entry(cache) {
        Entry::Occupied(entry) => *entry.get(),
        Entry::Vacant(entry) => *entry.insert(import_cache(module, cache)?),
    };
    Ok(Some(CacheSite::Imported(imported)))
}
