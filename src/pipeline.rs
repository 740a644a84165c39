//! Compilation pipeline behind the `valbox` CLI.
//!
//! - [`build_config`]: merge a config file with command-line overrides
//! - [`cache_plan`] / [`render_cache_plan`]: what the static box caches will
//!   contain for a configuration, without compiling anything
//! - [`compile_conversions`] / [`emit_object`]: produce the object file

use std::fmt;
use std::path::{Path, PathBuf};

use derive_more::{Display, From};
use tracing::info;
use valbox_core::{
    BackendConfig, BoxCache, BoxLayout, CacheRange, ClassId, ClassTable, ConfigError, OutputKind,
    TargetInfo,
};
use valbox_cranelift::CompilationError;

#[derive(Debug, Display, From, derive_more::Error)]
pub enum PipelineError {
    #[display("{_0}")]
    Config(#[error(source)] ConfigError),

    #[display("{_0}")]
    Compilation(#[error(source)] CompilationError),

    #[display("unknown class `{_0}`")]
    #[from(ignore)]
    UnknownClass(#[error(not(source))] String),

    #[display("failed to write {}: {source}", path.display())]
    #[from(ignore)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Load `config_path` (or start from the host defaults) and apply overrides.
///
/// A `memory-constrained` setting in the file still applies after `target`
/// replaces the file's triple.
pub fn build_config(
    config_path: Option<&Path>,
    target: Option<&str>,
    output_kind: Option<&str>,
) -> PipelineResult<BackendConfig> {
    let mut config = match config_path {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::host(),
    };
    if let Some(triple) = target {
        config.retarget(TargetInfo::parse(triple)?);
    }
    if let Some(kind) = output_kind {
        config.output_kind = kind.parse()?;
    }
    Ok(config)
}

/// Classes named on the command line, or every builtin that can be boxed.
pub fn requested_classes(classes: &ClassTable, names: &[String]) -> PipelineResult<Vec<ClassId>> {
    if names.is_empty() {
        return Ok(classes
            .inlined_classes()
            .filter(|(_, class)| class.is_box_target())
            .map(|(id, _)| id)
            .collect());
    }
    names
        .iter()
        .map(|name| {
            classes
                .find(name)
                .ok_or_else(|| PipelineError::UnknownClass(name.clone()))
        })
        .collect()
}

/// One row of the cache plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachePlanEntry {
    pub cache: BoxCache,
    pub range: CacheRange,
    pub entries: u64,
    pub bytes: u64,
}

impl fmt::Display for CachePlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, {} entries, {} bytes",
            self.cache.cache_symbol(),
            self.range,
            self.entries,
            self.bytes
        )
    }
}

/// Static caches a native binary would carry, or `None` for other outputs.
pub fn cache_plan(config: &BackendConfig) -> Option<Vec<CachePlanEntry>> {
    if !config.output_kind.is_native_binary() {
        return None;
    }
    let pointer_bytes = config.target.pointer_bytes();
    Some(
        BoxCache::ALL
            .into_iter()
            .map(|cache| {
                let range = config.cache_range(cache);
                let stride = BoxLayout::of(cache.scalar(), pointer_bytes).stride;
                CachePlanEntry {
                    cache,
                    range,
                    entries: range.len(),
                    bytes: range.len().saturating_mul(u64::from(stride)),
                }
            })
            .collect(),
    )
}

pub fn render_cache_plan(config: &BackendConfig) -> String {
    let mut out = format!("target: {}\n", config.target);
    let Some(plan) = cache_plan(config) else {
        out.push_str(&format!(
            "output: {} (caches are imported from the linked binary)\n",
            config.output_kind
        ));
        return out;
    };

    out.push_str(&format!("output: {}\n", config.output_kind));
    for entry in &plan {
        out.push_str(&format!("{entry}\n"));
    }
    let total = plan
        .iter()
        .fold(0u64, |total, entry| total.saturating_add(entry.bytes));
    out.push_str(&format!("total: {total} bytes\n"));
    out
}

/// Compile conversion functions for `requested` (plus the caches, for
/// native binaries) into object file bytes.
pub fn compile_conversions(
    classes: ClassTable,
    config: BackendConfig,
    requested: &[ClassId],
) -> PipelineResult<Vec<u8>> {
    let output_kind: OutputKind = config.output_kind;
    let bytes = valbox_cranelift::compile_to_object(classes, config, requested)?;
    info!(%output_kind, classes = requested.len(), bytes = bytes.len(), "compiled conversions");
    Ok(bytes)
}

/// [`compile_conversions`] and write the result to `output`.
pub fn emit_object(
    classes: ClassTable,
    config: BackendConfig,
    requested: &[ClassId],
    output: &Path,
) -> PipelineResult<()> {
    let bytes = compile_conversions(classes, config, requested)?;
    std::fs::write(output, bytes).map_err(|source| PipelineError::Io {
        path: output.to_owned(),
        source,
    })?;
    info!(path = %output.display(), "wrote object file");
    Ok(())
}
