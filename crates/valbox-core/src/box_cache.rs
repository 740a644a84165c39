//! Statically pre-boxed primitive kinds and their value ranges.

use std::fmt;
use std::ops::RangeInclusive;

use serde::Deserialize;

use crate::repr::{ClassId, ScalarKind};

/// Most entries a single cache may hold: a whole 16-bit domain.
pub const MAX_CACHE_ENTRIES: u64 = 1 << 16;

/// Primitive kinds with a static table of pre-built boxes.
///
/// The declaration order is the emission order of the cache tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoxCache {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
}

impl BoxCache {
    pub const ALL: [BoxCache; 6] = [
        BoxCache::Boolean,
        BoxCache::Byte,
        BoxCache::Short,
        BoxCache::Char,
        BoxCache::Int,
        BoxCache::Long,
    ];

    /// Upper-case name used in emitted symbol names.
    pub fn name(self) -> &'static str {
        match self {
            BoxCache::Boolean => "BOOLEAN",
            BoxCache::Byte => "BYTE",
            BoxCache::Short => "SHORT",
            BoxCache::Char => "CHAR",
            BoxCache::Int => "INT",
            BoxCache::Long => "LONG",
        }
    }

    /// The builtin class whose boxes this cache holds.
    pub fn class(self) -> ClassId {
        match self {
            BoxCache::Boolean => ClassId::BOOLEAN,
            BoxCache::Byte => ClassId::BYTE,
            BoxCache::Short => ClassId::SHORT,
            BoxCache::Char => ClassId::CHAR,
            BoxCache::Int => ClassId::INT,
            BoxCache::Long => ClassId::LONG,
        }
    }

    pub fn scalar(self) -> ScalarKind {
        match self {
            BoxCache::Boolean => ScalarKind::Bool,
            BoxCache::Byte => ScalarKind::I8,
            BoxCache::Short => ScalarKind::I16,
            BoxCache::Char => ScalarKind::Char,
            BoxCache::Int => ScalarKind::I32,
            BoxCache::Long => ScalarKind::I64,
        }
    }

    /// Every value representable by the kind.
    pub fn domain(self) -> CacheRange {
        match self {
            BoxCache::Boolean => CacheRange::new(0, 1),
            BoxCache::Byte => CacheRange::new(i8::MIN.into(), i8::MAX.into()),
            BoxCache::Short => CacheRange::new(i16::MIN.into(), i16::MAX.into()),
            BoxCache::Char => CacheRange::new(0, u16::MAX.into()),
            BoxCache::Int => CacheRange::new(i32::MIN.into(), i32::MAX.into()),
            BoxCache::Long => CacheRange::new(i64::MIN, i64::MAX),
        }
    }

    /// Range cached when neither the target nor the configuration says otherwise.
    ///
    /// Covers the small values seen most often; about 20 KiB in total.
    pub fn default_range(self) -> CacheRange {
        match self {
            BoxCache::Boolean => CacheRange::new(0, 1),
            BoxCache::Byte => CacheRange::new(-128, 127),
            BoxCache::Short => CacheRange::new(-128, 127),
            BoxCache::Char => CacheRange::new(0, 255),
            BoxCache::Int => CacheRange::new(-128, 127),
            BoxCache::Long => CacheRange::new(-128, 127),
        }
    }

    pub fn cache_symbol(self) -> String {
        format!("{}_CACHE", self.name())
    }

    pub fn range_from_symbol(self) -> String {
        format!("{}_RANGE_FROM", self.name())
    }

    pub fn range_to_symbol(self) -> String {
        format!("{}_RANGE_TO", self.name())
    }
}

impl fmt::Display for BoxCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive range of cached values. `start > end` means nothing is cached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheRange {
    #[serde(rename = "from")]
    pub start: i64,
    #[serde(rename = "to")]
    pub end: i64,
}

impl CacheRange {
    /// Canonical empty range. Range checks against it are always false.
    pub const EMPTY: CacheRange = CacheRange { start: 1, end: 0 };

    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of values in the range.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let len = i128::from(self.end) - i128::from(self.start) + 1;
        u64::try_from(len).unwrap_or(u64::MAX)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value <= self.end
    }

    /// Whether every value of `other` is in `self`. Empty ranges are contained everywhere.
    pub fn contains_range(&self, other: &CacheRange) -> bool {
        other.is_empty() || (self.contains(other.start) && self.contains(other.end))
    }

    pub fn values(&self) -> RangeInclusive<i64> {
        self.start..=self.end
    }

    /// Collapse every empty range to [`CacheRange::EMPTY`].
    pub fn normalized(self) -> Self {
        if self.is_empty() { Self::EMPTY } else { self }
    }
}

impl fmt::Display for CacheRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "[{}, {}]", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ranges() {
        assert_eq!(BoxCache::Int.default_range(), CacheRange::new(-128, 127));
        assert_eq!(BoxCache::Int.default_range().len(), 256);
        assert_eq!(BoxCache::Boolean.default_range().len(), 2);
        assert_eq!(BoxCache::Char.default_range(), CacheRange::new(0, 255));
        for cache in BoxCache::ALL {
            assert!(cache.domain().contains_range(&cache.default_range()));
        }
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(BoxCache::Int.cache_symbol(), "INT_CACHE");
        assert_eq!(BoxCache::Int.range_from_symbol(), "INT_RANGE_FROM");
        assert_eq!(BoxCache::Long.range_to_symbol(), "LONG_RANGE_TO");
        assert_eq!(BoxCache::Boolean.to_string(), "BOOLEAN");
    }

    #[test]
    fn test_empty_range() {
        let empty = CacheRange::EMPTY;
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.values().count(), 0);
        assert!(!empty.contains(0));
        assert!(!empty.contains(1));
        assert_eq!(CacheRange::new(10, -10).normalized(), CacheRange::EMPTY);
        assert_eq!(empty.to_string(), "empty");
    }

    #[test]
    fn test_long_domain_len_saturates() {
        assert_eq!(BoxCache::Long.domain().len(), u64::MAX);
        assert_eq!(BoxCache::Int.domain().len(), 1 << 32);
    }

    #[test]
    fn test_sixteen_bit_domains_fit_the_entry_limit() {
        assert_eq!(BoxCache::Short.domain().len(), MAX_CACHE_ENTRIES);
        assert_eq!(BoxCache::Char.domain().len(), MAX_CACHE_ENTRIES);
        assert!(BoxCache::Int.domain().len() > MAX_CACHE_ENTRIES);
    }

    #[test]
    fn test_class_and_scalar_agree() {
        use crate::repr::ClassTable;

        let table = ClassTable::new();
        for cache in BoxCache::ALL {
            let class = table.inlined(cache.class()).unwrap();
            assert_eq!(class.scalar(), cache.scalar());
            assert_eq!(table.box_cache_of(cache.class()), Some(cache));
        }
    }
}
