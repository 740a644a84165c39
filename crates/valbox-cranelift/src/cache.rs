//! Static box cache emission.
//!
//! For every [`BoxCache`] kind a native binary carries three exported
//! read-only globals:
//!
//! - `{KIND}_RANGE_FROM`, `{KIND}_RANGE_TO`: inclusive bounds, stored with
//!   the kind's own width.
//! - `{KIND}_CACHE`: one pre-built boxed object per value in the range, in
//!   ascending order, each with the static refcount and the class's runtime
//!   type index. Entries are [`BoxLayout::stride`] bytes apart.
//!
//! On a memory-constrained target the range is `(1, 0)` and the cache has
//! no entries; the globals are still defined so that code compiled for a
//! library output, which imports them, links against any native binary.
//!
//! Library outputs define nothing here: their box functions import the
//! globals of whatever binary they end up linked into (see [`import_cache`]).

use cranelift_codegen::ir::Endianness;
use cranelift_module::{DataDescription, DataId, Linkage, Module};
use tracing::{debug, trace};
use valbox_core::layout::{OBJECT_ALIGN, STATIC_REFCOUNT};
use valbox_core::{
    BackendConfig, BoxCache, BoxLayout, CacheRange, ClassId, ClassTable, MAX_CACHE_ENTRIES,
};

use crate::errors::{CompilationError, CompilationResult};

/// The emitted globals of one cache kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheTable {
    pub cache: BoxCache,
    pub class: ClassId,
    pub range: CacheRange,
    pub layout: BoxLayout,
    pub range_from: DataId,
    pub range_to: DataId,
    pub entries: DataId,
}

impl CacheTable {
    /// Size of the `{KIND}_CACHE` array in bytes.
    pub fn entries_size(&self) -> u64 {
        self.range.len().saturating_mul(u64::from(self.layout.stride))
    }
}

/// All cache tables of a native binary, in [`BoxCache::ALL`] order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheTables {
    tables: Vec<CacheTable>,
}

impl CacheTables {
    pub fn get(&self, cache: BoxCache) -> Option<&CacheTable> {
        self.tables.iter().find(|table| table.cache == cache)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Bytes of static data taken by all cache arrays.
    pub fn total_size(&self) -> u64 {
        self.tables.iter().map(CacheTable::entries_size).sum()
    }
}

/// Cache globals declared as imports by a library output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportedCache {
    pub range_from: DataId,
    pub range_to: DataId,
    pub entries: DataId,
}

/// Emit the static box caches of every kind.
///
/// Returns `None` without touching the module when the output is not a
/// native binary.
pub fn initialize_cached_boxes<M: Module>(
    module: &mut M,
    classes: &ClassTable,
    config: &BackendConfig,
) -> CompilationResult<Option<CacheTables>> {
    if !config.output_kind.is_native_binary() {
        debug!(output_kind = %config.output_kind, "skipping static box caches");
        return Ok(None);
    }

    let mut tables = Vec::with_capacity(BoxCache::ALL.len());
    for cache in BoxCache::ALL {
        tables.push(init_cache(module, classes, config, cache)?);
    }
    let tables = CacheTables { tables };
    debug!(
        target = %config.target,
        bytes = tables.total_size(),
        "emitted static box caches"
    );
    Ok(Some(tables))
}

fn init_cache<M: Module>(
    module: &mut M,
    classes: &ClassTable,
    config: &BackendConfig,
    cache: BoxCache,
) -> CompilationResult<CacheTable> {
    let class_id = cache.class();
    let class = classes
        .inlined(class_id)
        .ok_or_else(|| CompilationError::not_inlined(classes.name(class_id)))?;

    let pointer_bytes = u32::from(module.target_config().pointer_bytes());
    let endianness = module.isa().endianness();
    let scalar = class.scalar();
    let width = scalar.size(pointer_bytes);
    let range = config.cache_range(cache);
    let layout = BoxLayout::of(scalar, pointer_bytes);
    if range.len() > MAX_CACHE_ENTRIES {
        return Err(CompilationError::cache_too_large(cache, range));
    }
    let entries = build_entries(range, layout, class.rtti_idx(), endianness)
        .ok_or_else(|| CompilationError::cache_too_large(cache, range))?;

    let range_from = define_constant(
        module,
        &cache.range_from_symbol(),
        encode_scalar(range.start, width, endianness),
        width,
    )?;
    let range_to = define_constant(
        module,
        &cache.range_to_symbol(),
        encode_scalar(range.end, width, endianness),
        width,
    )?;
    let entries = define_constant(module, &cache.cache_symbol(), entries, OBJECT_ALIGN)?;

    trace!(%cache, %range, stride = layout.stride, "defined box cache");
    Ok(CacheTable {
        cache,
        class: class_id,
        range,
        layout,
        range_from,
        range_to,
        entries,
    })
}

/// Declare the three globals of `cache` as imports.
pub fn import_cache<M: Module>(
    module: &mut M,
    cache: BoxCache,
) -> CompilationResult<ImportedCache> {
    let mut import = |name: String| module.declare_data(&name, Linkage::Import, false, false);
    Ok(ImportedCache {
        range_from: import(cache.range_from_symbol())?,
        range_to: import(cache.range_to_symbol())?,
        entries: import(cache.cache_symbol())?,
    })
}

fn define_constant<M: Module>(
    module: &mut M,
    name: &str,
    bytes: Vec<u8>,
    align: u32,
) -> CompilationResult<DataId> {
    let id = module.declare_data(name, Linkage::Export, false, false)?;
    let mut description = DataDescription::new();
    description.define(bytes.into_boxed_slice());
    description.set_align(u64::from(align));
    module.define_data(id, &description)?;
    Ok(id)
}

/// The low `width` bytes of `value` in target byte order.
pub(crate) fn encode_scalar(value: i64, width: u32, endianness: Endianness) -> Vec<u8> {
    let mut bytes = value.to_le_bytes()[..width as usize].to_vec();
    if endianness == Endianness::Big {
        bytes.reverse();
    }
    bytes
}

/// Contents of a `{KIND}_CACHE` array covering `range`, or `None` when its
/// size does not fit in the host address space.
pub(crate) fn build_entries(
    range: CacheRange,
    layout: BoxLayout,
    rtti_idx: u32,
    endianness: Endianness,
) -> Option<Vec<u8>> {
    let stride = layout.stride as usize;
    let size = usize::try_from(range.len()).ok()?.checked_mul(stride)?;
    let mut bytes = Vec::with_capacity(size);
    for value in range.values() {
        let start = bytes.len();
        bytes.extend(encode_scalar(i64::from(STATIC_REFCOUNT), 4, endianness));
        bytes.extend(encode_scalar(i64::from(rtti_idx), 4, endianness));
        bytes.resize(start + layout.payload_offset as usize, 0);
        bytes.extend(encode_scalar(value, layout.payload_size, endianness));
        bytes.resize(start + stride, 0);
    }
    Some(bytes)
}
