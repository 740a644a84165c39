//! Compilation target and output kind.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use target_lexicon::{Architecture, OperatingSystem, Triple};

use crate::box_cache::{BoxCache, CacheRange};
use crate::config::ConfigError;

/// Target descriptor consulted for per-target code generation policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    triple: Triple,
    memory_constrained: bool,
}

impl TargetInfo {
    pub fn new(triple: Triple) -> Self {
        let memory_constrained = is_memory_constrained(&triple);
        Self {
            triple,
            memory_constrained,
        }
    }

    pub fn host() -> Self {
        Self::new(Triple::host())
    }

    pub fn parse(triple: &str) -> Result<Self, ConfigError> {
        Triple::from_str(triple)
            .map(Self::new)
            .map_err(|_| ConfigError::UnknownTarget(triple.to_owned()))
    }

    /// Force the memory-constrained flag regardless of what the triple implies.
    pub fn with_memory_constrained(mut self, constrained: bool) -> Self {
        self.memory_constrained = constrained;
        self
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn is_memory_constrained(&self) -> bool {
        self.memory_constrained
    }

    pub fn pointer_bytes(&self) -> u32 {
        self.triple
            .pointer_width()
            .map(|width| u32::from(width.bytes()))
            .unwrap_or(8)
    }

    /// Target-specific box cache range, taking precedence over any other policy.
    pub fn box_cache_range_override(&self, cache: BoxCache) -> Option<CacheRange> {
        if !self.memory_constrained {
            return None;
        }
        Some(match cache {
            BoxCache::Boolean
            | BoxCache::Byte
            | BoxCache::Short
            | BoxCache::Char
            | BoxCache::Int
            | BoxCache::Long => CacheRange::EMPTY,
        })
    }
}

impl fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)?;
        if self.memory_constrained {
            write!(f, " (memory-constrained)")?;
        }
        Ok(())
    }
}

/// Bare-metal and microcontroller targets have no room for static box tables.
fn is_memory_constrained(triple: &Triple) -> bool {
    triple.operating_system == OperatingSystem::None_
        || matches!(triple.architecture, Architecture::Avr)
}

/// Kind of artifact the compilation produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputKind {
    /// Executable program.
    #[default]
    Program,
    /// Self-contained shared library.
    Dynamic,
    /// Self-contained static library.
    Static,
    /// Compiler library linked later into some other binary.
    Library,
    /// Test runner linked against a library under test.
    TestHarness,
}

impl OutputKind {
    pub const ALL: [OutputKind; 5] = [
        OutputKind::Program,
        OutputKind::Dynamic,
        OutputKind::Static,
        OutputKind::Library,
        OutputKind::TestHarness,
    ];

    /// Whether the artifact is a standalone native binary that must carry its
    /// own static data.
    pub fn is_native_binary(self) -> bool {
        match self {
            OutputKind::Program | OutputKind::Dynamic | OutputKind::Static => true,
            OutputKind::Library | OutputKind::TestHarness => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputKind::Program => "program",
            OutputKind::Dynamic => "dynamic",
            OutputKind::Static => "static",
            OutputKind::Library => "library",
            OutputKind::TestHarness => "test-harness",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownOutputKind(s.to_owned()))
    }
}
