//! Helper functions for the allocator that don't belong to any concrete module.

/// Rounds `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. This is used to place every block
/// header on a [`crate::block::BLOCK_ALIGN`] boundary and to round the header
/// footprint itself, so payloads inherit the same alignment.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of wrapping around when
/// `to_be_aligned` sits at the very top of the address space.
#[inline]
pub const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(value) => Some(value & !(alignment - 1)),
        None => None,
    }
}
