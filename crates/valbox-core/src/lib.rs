//! Shared model for the valbox boxing backend.
//!
//! This crate holds everything the code generator needs to know before it
//! touches Cranelift: which classes are inlined, which boxed kinds have a
//! static cache, how boxed objects are laid out, and the per-target policy.

pub mod box_cache;
pub mod config;
pub mod layout;
pub mod repr;
pub mod target;

pub use box_cache::{BoxCache, CacheRange, MAX_CACHE_ENTRIES};
pub use config::{BackendConfig, BoxCacheConfig, ConfigError};
pub use layout::BoxLayout;
pub use repr::{ClassId, ClassInfo, ClassKind, ClassTable, InlinedClass, Repr, ScalarKind, Type};
pub use target::{OutputKind, TargetInfo};
