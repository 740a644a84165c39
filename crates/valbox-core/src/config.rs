//! Backend configuration.
//!
//! Configuration can be built programmatically or loaded from a TOML file:
//!
//! ```toml
//! target = "x86_64-unknown-linux-gnu"
//! output-kind = "program"
//! memory-constrained = false
//!
//! [box-cache]
//! int = { from = -1024, to = 1023 }
//! char = { from = 1, to = 0 }   # disable the CHAR cache
//! ```

use std::path::{Path, PathBuf};

use derive_more::Display;
use serde::Deserialize;
use tracing::debug;

use crate::box_cache::{BoxCache, CacheRange, MAX_CACHE_ENTRIES};
use crate::target::{OutputKind, TargetInfo};

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[display("invalid configuration: {_0}")]
    Toml(toml::de::Error),

    #[display("unknown target triple `{_0}`")]
    UnknownTarget(String),

    #[display("unknown output kind `{_0}`")]
    UnknownOutputKind(String),

    #[display("{cache} cache range {range} is outside the representable domain {domain}")]
    RangeOutOfDomain {
        cache: BoxCache,
        range: CacheRange,
        domain: CacheRange,
    },

    #[display("{cache} cache range {range} has {entries} entries, the limit is {limit}")]
    RangeTooLarge {
        cache: BoxCache,
        range: CacheRange,
        entries: u64,
        limit: u64,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::Toml(error)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-kind overrides of the default box cache ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoxCacheConfig {
    pub boolean: Option<CacheRange>,
    pub byte: Option<CacheRange>,
    pub short: Option<CacheRange>,
    pub char: Option<CacheRange>,
    pub int: Option<CacheRange>,
    pub long: Option<CacheRange>,
}

impl BoxCacheConfig {
    pub fn get(&self, cache: BoxCache) -> Option<CacheRange> {
        match cache {
            BoxCache::Boolean => self.boolean,
            BoxCache::Byte => self.byte,
            BoxCache::Short => self.short,
            BoxCache::Char => self.char,
            BoxCache::Int => self.int,
            BoxCache::Long => self.long,
        }
    }

    pub fn set(&mut self, cache: BoxCache, range: CacheRange) {
        let slot = match cache {
            BoxCache::Boolean => &mut self.boolean,
            BoxCache::Byte => &mut self.byte,
            BoxCache::Short => &mut self.short,
            BoxCache::Char => &mut self.char,
            BoxCache::Int => &mut self.int,
            BoxCache::Long => &mut self.long,
        };
        *slot = Some(range.normalized());
    }

    /// Reject non-empty ranges that reach outside what the kind can represent
    /// or hold more than [`MAX_CACHE_ENTRIES`] values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for cache in BoxCache::ALL {
            let Some(range) = self.get(cache) else {
                continue;
            };
            let domain = cache.domain();
            if !domain.contains_range(&range) {
                return Err(ConfigError::RangeOutOfDomain {
                    cache,
                    range,
                    domain,
                });
            }
            if range.len() > MAX_CACHE_ENTRIES {
                return Err(ConfigError::RangeTooLarge {
                    cache,
                    range,
                    entries: range.len(),
                    limit: MAX_CACHE_ENTRIES,
                });
            }
        }
        Ok(())
    }
}

/// On-disk form of [`BackendConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigFile {
    target: Option<String>,
    output_kind: Option<OutputKind>,
    memory_constrained: Option<bool>,
    box_cache: BoxCacheConfig,
}

/// Everything the boxing backend needs to know about the compilation.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub target: TargetInfo,
    pub output_kind: OutputKind,
    pub box_cache: BoxCacheConfig,
    /// Explicit `memory-constrained` setting. Wins over the triple's default,
    /// including after [`BackendConfig::retarget`].
    pub memory_constrained: Option<bool>,
}

impl BackendConfig {
    pub fn new(target: TargetInfo, output_kind: OutputKind) -> Self {
        Self {
            target,
            output_kind,
            box_cache: BoxCacheConfig::default(),
            memory_constrained: None,
        }
    }

    /// Program output for the host.
    pub fn host() -> Self {
        Self::new(TargetInfo::host(), OutputKind::Program)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;

        let mut target = match file.target.as_deref() {
            Some(triple) => TargetInfo::parse(triple)?,
            None => TargetInfo::host(),
        };
        if let Some(constrained) = file.memory_constrained {
            target = target.with_memory_constrained(constrained);
        }

        let mut box_cache = BoxCacheConfig::default();
        for cache in BoxCache::ALL {
            if let Some(range) = file.box_cache.get(cache) {
                box_cache.set(cache, range);
            }
        }
        box_cache.validate()?;

        Ok(Self {
            target,
            output_kind: file.output_kind.unwrap_or_default(),
            box_cache,
            memory_constrained: file.memory_constrained,
        })
    }

    /// Switch to `target`, keeping an explicit `memory-constrained` setting.
    pub fn retarget(&mut self, target: TargetInfo) {
        self.target = match self.memory_constrained {
            Some(constrained) => target.with_memory_constrained(constrained),
            None => target,
        };
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        debug!(
            path = %path.display(),
            target = %config.target,
            output_kind = %config.output_kind,
            "loaded backend configuration"
        );
        Ok(config)
    }

    /// Box cache range for `cache`: the target's override first, then the
    /// configured range, then the kind's default.
    pub fn cache_range(&self, cache: BoxCache) -> CacheRange {
        if let Some(range) = self.target.box_cache_range_override(cache) {
            return range;
        }
        self.box_cache
            .get(cache)
            .map(CacheRange::normalized)
            .unwrap_or_else(|| cache.default_range())
    }
}
