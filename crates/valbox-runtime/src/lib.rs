//! valbox runtime library.
//!
//! Provides the native runtime functions required by boxing code in compiled
//! programs:
//! - Heap allocation of boxes (`__valbox_alloc`, `__valbox_dealloc`)
//! - Reference counting that never frees static cache entries
//!   (`__valbox_retain`, `__valbox_release`)
//!
//! The object header layout here must match `valbox_core::layout`.

use std::alloc::Layout;
use std::sync::atomic::{AtomicU64, Ordering};

/// Standard header at the start of every boxed object.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjHeader {
    pub refcount: u32,
    pub rtti_idx: u32,
}

pub const HEADER_SIZE: usize = size_of::<ObjHeader>();

/// Refcount of objects placed in static data by the compiler.
pub const STATIC_REFCOUNT: u32 = u32::MAX;

const OBJECT_ALIGN: usize = 8;

static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Number of successful `__valbox_alloc` calls since process start.
pub fn allocation_count() -> u64 {
    ALLOCATIONS.load(Ordering::Relaxed)
}

// =============================================================================
// Allocator
// =============================================================================

/// # Safety
///
/// Caller must eventually free the returned pointer via `__valbox_dealloc`
/// with the same `size`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __valbox_alloc(size: u64) -> *mut u8 {
    if size == 0 {
        return std::ptr::null_mut();
    }
    let Ok(size) = usize::try_from(size) else {
        return std::ptr::null_mut();
    };
    let Ok(layout) = Layout::from_size_align(size, OBJECT_ALIGN) else {
        return std::ptr::null_mut();
    };
    let ptr = unsafe { std::alloc::alloc(layout) };
    if !ptr.is_null() {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    }
    ptr
}

/// # Safety
///
/// `ptr` must have been allocated by `__valbox_alloc` with the same `size`,
/// or be null (in which case this is a no-op).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __valbox_dealloc(ptr: *mut u8, size: u64) {
    if ptr.is_null() || size == 0 {
        return;
    }
    let Ok(size) = usize::try_from(size) else {
        return;
    };
    let Ok(layout) = Layout::from_size_align(size, OBJECT_ALIGN) else {
        return;
    };
    unsafe { std::alloc::dealloc(ptr, layout) };
}

// =============================================================================
// Reference counting
// =============================================================================

/// Add one reference. Heap objects saturate one below [`STATIC_REFCOUNT`]
/// so they never read as static.
///
/// # Safety
///
/// `obj` must be null or point to a live boxed object.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __valbox_retain(obj: *mut ObjHeader) {
    if obj.is_null() {
        return;
    }
    let header = unsafe { &mut *obj };
    if header.refcount < STATIC_REFCOUNT - 1 {
        header.refcount += 1;
    }
}

/// Drop one reference, freeing the object (of `size` bytes) when it was the
/// last one. Returns whether the object was freed.
///
/// # Safety
///
/// `obj` must be null or point to a live boxed object whose total size is `size`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __valbox_release(obj: *mut ObjHeader, size: u64) -> bool {
    if obj.is_null() {
        return false;
    }
    let header = unsafe { &mut *obj };
    match header.refcount {
        STATIC_REFCOUNT => false,
        0 | 1 => {
            unsafe { __valbox_dealloc(obj.cast(), size) };
            true
        }
        _ => {
            header.refcount -= 1;
            false
        }
    }
}

// =============================================================================
// Inspection helpers
// =============================================================================

/// Whether `obj` lives in a static box cache.
///
/// # Safety
///
/// `obj` must point to a live boxed object.
pub unsafe fn is_static(obj: *const ObjHeader) -> bool {
    unsafe { (*obj).refcount == STATIC_REFCOUNT }
}

/// Read the payload of type `T` stored at `offset` bytes from the object start.
///
/// # Safety
///
/// `obj` must point to a live boxed object with a `T` payload at `offset`.
pub unsafe fn read_payload<T: Copy>(obj: *const ObjHeader, offset: usize) -> T {
    unsafe { obj.cast::<u8>().add(offset).cast::<T>().read_unaligned() }
}
