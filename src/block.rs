use std::{mem, ptr::NonNull};

use crate::{list::Node, utils::align};

/// Every header is placed on this boundary, and so is every payload.
pub const BLOCK_ALIGN: usize = 16;

/// Header size of a block. We need to add the overhead introduced by our
/// [`Node`] structure since a `Block` always lives inside a node of either the
/// free list or the allocated list. Rounded up to [`BLOCK_ALIGN`] so that the
/// payload right after an aligned header is aligned too.
pub(crate) const HEADER_SIZE: usize = align(mem::size_of::<Node<Block>>(), BLOCK_ALIGN);

/// Metadata of a block. Content is placed right after the header.
///
/// The diagram ignores that the block is wrapped inside a [`Node`], which adds
/// the `next` and `prev` links in front of these fields:
///
/// ```text
/// +---------------------+ <------+
/// |     next / prev     |        |
/// +---------------------+        |
/// |        size         |        | -> Header (HEADER_SIZE bytes)
/// +---------------------+        |
/// |   allocated (1b)    |        |
/// +---------------------+ <------+ <-- pointer handed to the caller
/// |       Content       |        |
/// |         ...         |        | -> `size` usable bytes
/// |                     |        |
/// +---------------------+ <------+
/// ```
///
/// `size` is fixed when the block is carved out of the region and never
/// changes afterwards: blocks are neither split nor coalesced.
pub(crate) struct Block {
    /// Usable bytes following the header.
    pub size: usize,
    /// Whether the block sits on the allocated list (`true`) or the free list.
    pub allocated: bool,
}

/// Address of the payload that follows `header`.
#[inline]
pub(crate) fn payload(header: NonNull<Node<Block>>) -> NonNull<u8> {
    unsafe { header.cast::<u8>().add(HEADER_SIZE) }
}

/// Recovers the header in front of a payload.
///
/// **SAFETY**: `payload` must have been produced by [`payload`].
#[inline]
pub(crate) unsafe fn header(payload: NonNull<u8>) -> NonNull<Node<Block>> {
    unsafe { payload.sub(HEADER_SIZE).cast() }
}
