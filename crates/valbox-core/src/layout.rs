//! Memory layout of boxed objects.
//!
//! Every boxed value starts with the standard object header followed by its
//! scalar payload:
//!
//! | Offset | Size | Field      |
//! |--------|------|------------|
//! | 0      | 4    | `refcount` |
//! | 4      | 4    | `rtti_idx` |
//! | 8      | n    | payload    |
//!
//! The payload is naturally aligned after the header and the whole object is
//! padded to [`OBJECT_ALIGN`], which is also the stride of static cache arrays.

use crate::repr::ScalarKind;

/// Size of the object header in bytes.
pub const HEADER_SIZE: u32 = 8;

pub const REFCOUNT_OFFSET: i32 = 0;

pub const RTTI_OFFSET: i32 = 4;

/// Alignment of every heap or static object.
pub const OBJECT_ALIGN: u32 = 8;

/// Refcount of freshly allocated boxes.
pub const INITIAL_REFCOUNT: u32 = 1;

/// Refcount marking objects that live in static data and are never freed.
pub const STATIC_REFCOUNT: u32 = u32::MAX;

/// Layout of one boxed scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxLayout {
    /// Byte offset of the payload from the start of the object.
    pub payload_offset: u32,
    pub payload_size: u32,
    /// Header plus payload, unpadded. This is what gets allocated.
    pub size: u32,
    /// Distance between consecutive objects in a static array.
    pub stride: u32,
}

impl BoxLayout {
    pub fn of(scalar: ScalarKind, pointer_bytes: u32) -> Self {
        let payload_size = scalar.size(pointer_bytes);
        let payload_offset = align_to(HEADER_SIZE, scalar.align(pointer_bytes));
        let size = payload_offset + payload_size;
        Self {
            payload_offset,
            payload_size,
            size,
            stride: align_to(size, OBJECT_ALIGN),
        }
    }
}

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_layout() {
        let layout = BoxLayout::of(ScalarKind::I32, 8);
        assert_eq!(layout.payload_offset, 8);
        assert_eq!(layout.payload_size, 4);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.stride, 16);
    }

    #[test]
    fn test_bool_layout_is_padded() {
        let layout = BoxLayout::of(ScalarKind::Bool, 8);
        assert_eq!(layout.size, 9);
        assert_eq!(layout.stride, 16);
    }

    #[test]
    fn test_pointer_layout_follows_target_width() {
        assert_eq!(BoxLayout::of(ScalarKind::Ptr, 8).size, 16);
        assert_eq!(BoxLayout::of(ScalarKind::Ptr, 4).size, 12);
        assert_eq!(BoxLayout::of(ScalarKind::Ptr, 4).stride, 16);
    }

    #[test]
    fn test_long_layout_has_no_padding() {
        let layout = BoxLayout::of(ScalarKind::I64, 4);
        assert_eq!(layout.payload_offset, 8);
        assert_eq!(layout.size, 16);
        assert_eq!(layout.stride, 16);
    }
}
